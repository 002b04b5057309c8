//! Wire codec boundary between sockets and the command layer.

pub mod protocol;
