use std::str;

pub(super) fn parse_i64(payload: &[u8]) -> Result<i64, ()> {
    let Ok(text) = str::from_utf8(payload) else {
        return Err(());
    };
    text.parse::<i64>().map_err(|_| ())
}

pub(super) fn parse_finite_f64(payload: &[u8]) -> Result<f64, ()> {
    let Ok(text) = str::from_utf8(payload) else {
        return Err(());
    };
    let value = text.parse::<f64>().map_err(|_| ())?;
    if value.is_finite() { Ok(value) } else { Err(()) }
}
