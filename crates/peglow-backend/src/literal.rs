//! Spelling of terminals in generated Rust and in grammar listings.

use std::fmt;

use bstr::BStr;

/// A terminal spelled as a Rust literal, `b'x'` or `b"xy"`.
#[derive(Clone, Copy)]
pub enum RustLiteral<'a> {
    Byte(u8),
    Bytes(&'a [u8]),
}

impl fmt::Display for RustLiteral<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // byte literals only admit ascii, everything else goes through `\x` escapes
        match *self {
            RustLiteral::Byte(byte) => write!(f, "b'{}'", byte.escape_ascii()),
            RustLiteral::Bytes(bytes) => write!(f, "b\"{}\"", bytes.escape_ascii()),
        }
    }
}

/// A terminal in grammar notation, `'x'` for a single byte and `"xy"` for a literal.
#[derive(Clone, Copy)]
pub enum Quoted<'a> {
    Byte(u8),
    Literal(&'a [u8]),
}

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Quoted::Byte(byte @ 0x80..) => write!(f, "'\\x{byte:02X}'"),
            Quoted::Byte(byte) => write!(f, "'{}'", char::from(byte).escape_debug()),
            Quoted::Literal(bytes) => write!(f, "{:?}", BStr::new(bytes)),
        }
    }
}
