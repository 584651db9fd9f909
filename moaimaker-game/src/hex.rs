use crate::{Error, Result};

/// Upper-case two-digit bytes separated by single spaces, e.g. `"03 10 02 03"`.
pub fn to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<String>>()
        .join(" ")
}

/// Parses whitespace-separated hex bytes. Each token must be one or two hex
/// digits; anything else rejects the whole input.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    s.split_whitespace()
        .map(|token| {
            if token.len() > 2 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(Error::Format(format!("invalid hex byte {token:?}")));
            }
            u8::from_str_radix(token, 16)
                .map_err(|_| Error::Format(format!("invalid hex byte {token:?}")))
        })
        .collect()
}
