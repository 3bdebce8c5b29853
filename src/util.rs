use crate::Result;
use std::ffi::{c_char, CString};



pub(crate) fn to_cstring(s: &str) -> Result<CString> {
    Ok(CString::new(s)?)
}

/// Decodes a fixed-length, NUL-terminated field of a native struct.
pub(crate) fn fixed_to_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter()
        .map(|&c| c as u8)
        .take_while(|&b| b != 0)
        .collect();

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Bytes of a two-phase string transfer, up to the first NUL.
pub(crate) fn bytes_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());

    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(any(test, feature = "mock"))]
pub(crate) fn string_to_fixed<const N: usize>(s: &str) -> [c_char; N] {
    let mut out = [0 as c_char; N];

    for (dst, &b) in out.iter_mut().zip(s.as_bytes().iter().take(N - 1)) {
        *dst = b as c_char;
    }

    out
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_strings_stop_at_nul() {
        let raw: [c_char; 8] = string_to_fixed("Kaya");

        assert_eq!(fixed_to_string(&raw), "Kaya");
    }

    #[test]
    fn fixed_strings_keep_room_for_the_terminator() {
        let raw: [c_char; 4] = string_to_fixed("abcdef");

        assert_eq!(raw[3], 0);
        assert_eq!(fixed_to_string(&raw), "abc");
    }

    #[test]
    fn interior_nul_is_an_invalid_argument() {
        assert!(matches!(to_cstring("Wid\0th"), Err(crate::Error::InvalidArgument(_))));
    }

    #[test]
    fn transfer_bytes_drop_the_terminator() {
        assert_eq!(bytes_to_string(b"Mono8\0"), "Mono8");
        assert_eq!(bytes_to_string(b"Mono8"), "Mono8");
    }
}
