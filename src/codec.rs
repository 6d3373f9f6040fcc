//! Minimal big-endian wire codec for record-content headers.
//!
//! This mirrors the cursor-based `Reader`/`Codec` pair the rest of the
//! splicer's host library uses for parsing TLS structures: a `Reader`
//! never panics on short input, instead returning `None` so callers can
//! decide between "not enough data yet" and "malformed".
use std::convert::TryInto;

/// A short, read-only cursor over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    offs: usize,
}

impl<'a> Reader<'a> {
    pub fn init(bytes: &'a [u8]) -> Self {
        Self {
            buf: bytes,
            offs: 0,
        }
    }

    /// Bytes not yet consumed.
    pub fn left(&self) -> usize {
        self.buf.len() - self.offs
    }

    pub fn any_left(&self) -> bool {
        self.left() > 0
    }

    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.left() < len {
            return None;
        }
        let start = self.offs;
        self.offs += len;
        Some(&self.buf[start..self.offs])
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.offs..];
        self.offs = self.buf.len();
        rest
    }
}

pub trait Codec: Sized {
    fn read(r: &mut Reader) -> Option<Self>;
    fn encode(&self, out: &mut Vec<u8>);
}

impl Codec for u8 {
    fn read(r: &mut Reader) -> Option<Self> {
        r.take(1).map(|b| b[0])
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl Codec for u16 {
    fn read(r: &mut Reader) -> Option<Self> {
        r.take(2).map(|b| u16::from_be_bytes(b.try_into().unwrap()))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
}

/// A 24-bit big-endian unsigned integer, as used for TLS handshake and
/// DTLS fragment lengths/offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U24(pub u32);

impl U24 {
    pub const MAX: u32 = 0x00ff_ffff;

    pub fn encode_be(self, out: &mut Vec<u8>) {
        let b = self.0.to_be_bytes();
        out.extend_from_slice(&b[1..]);
    }
}

impl Codec for U24 {
    fn read(r: &mut Reader) -> Option<Self> {
        let b = r.take(3)?;
        Some(U24(u32::from_be_bytes([0, b[0], b[1], b[2]])))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_be(out)
    }
}
