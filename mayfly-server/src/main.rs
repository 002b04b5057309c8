//! Binary entrypoint for `mayfly-server`.

mod app;
mod network;

fn main() {
    if let Err(err) = app::run() {
        eprintln!("failed to start mayfly-server: {err}");
        std::process::exit(1);
    }
}
