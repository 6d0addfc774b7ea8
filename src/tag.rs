use crate::error::ParseError;
use std::fmt;

/// Generate a 4-byte font table tag from byte string
///
/// Example:
///
/// ```
/// assert_eq!(tag!(b"GSUB"), 0x47535542);
/// ```
macro_rules! tag {
    ($w:expr) => {
        tag(*$w)
    };
}

#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DisplayTag(pub u32);

const fn tag(chars: [u8; 4]) -> u32 {
    ((chars[3] as u32) << 0)
        | ((chars[2] as u32) << 8)
        | ((chars[1] as u32) << 16)
        | ((chars[0] as u32) << 24)
}

pub fn from_string(s: &str) -> Result<u32, ParseError> {
    if s.len() > 4 {
        return Err(ParseError::BadValue);
    }

    let mut tag: u32 = 0;
    let mut count = 0;

    for c in s.chars() {
        if !c.is_ascii() || c.is_ascii_control() {
            return Err(ParseError::BadValue);
        }

        tag = (tag << 8) | (c as u32);
        count += 1;
    }

    while count < 4 {
        tag = (tag << 8) | (' ' as u32);
        count += 1;
    }

    Ok(tag)
}

impl fmt::Display for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.0;
        let mut s = String::with_capacity(4);
        s.push(char::from((tag >> 24) as u8));
        s.push(char::from(((tag >> 16) & 255) as u8));
        s.push(char::from(((tag >> 8) & 255) as u8));
        s.push(char::from((tag & 255) as u8));
        if s.chars().any(|c| !c.is_ascii() || c.is_ascii_control()) {
            write!(f, "0x{:08x}", tag)
        } else {
            s.fmt(f)
        }
    }
}

impl fmt::Debug for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_string().fmt(f)
    }
}

pub const ARAB: u32 = tag!(b"arab");
pub const CMAP: u32 = tag!(b"cmap");
pub const CYRL: u32 = tag!(b"cyrl");
pub const DFLT: u32 = tag!(b"DFLT");
pub const GDEF: u32 = tag!(b"GDEF");
pub const GLYF: u32 = tag!(b"glyf");
pub const GPOS: u32 = tag!(b"GPOS");
pub const GREK: u32 = tag!(b"grek");
pub const GSUB: u32 = tag!(b"GSUB");
pub const HEAD: u32 = tag!(b"head");
pub const KERN: u32 = tag!(b"kern");
pub const LATN: u32 = tag!(b"latn");
pub const LIGA: u32 = tag!(b"liga");
pub const MARK: u32 = tag!(b"mark");
pub const MAXP: u32 = tag!(b"maxp");
pub const MKMK: u32 = tag!(b"mkmk");
pub const OTTO: u32 = tag!(b"OTTO");
pub const SMCP: u32 = tag!(b"smcp");
pub const SYRC: u32 = tag!(b"syrc");
pub const TTCF: u32 = tag!(b"ttcf");
pub const URD: u32 = tag!(b"URD ");

#[cfg(test)]
mod tests {
    use super::*;

    mod from_string {
        use super::*;

        #[test]
        fn test_four_chars() {
            let tag = from_string("arab").expect("invalid tag");

            assert_eq!(tag, super::ARAB);
        }

        #[test]
        fn test_three_chars() {
            let tag = from_string("URD").expect("invalid tag");

            assert_eq!(tag, super::URD);
        }

        #[test]
        fn test_too_long() {
            assert!(from_string("abcde").is_err());
        }
    }

    mod display_tag {
        use crate::tag::{DisplayTag, GSUB};

        #[test]
        fn test_ascii() {
            assert_eq!(DisplayTag(GSUB).to_string(), "GSUB".to_string());
        }

        #[test]
        fn test_non_ascii() {
            assert_eq!(DisplayTag(0x12345678).to_string(), "0x12345678".to_string());
        }
    }
}
