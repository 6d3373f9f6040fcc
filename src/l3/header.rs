//! Wire layout for handshake record headers. TLS carries `type | u24
//! length`; DTLS additionally carries a message sequence number and a
//! fragment offset/length pair so a single logical message can be split
//! across several records.

use crate::codec::{Codec, Reader, U24};

pub const TLS_HS_HEADER_LEN: usize = 4;
pub const DTLS_HS_HEADER_LEN: usize = 12;

pub fn encode_tls_hs_header(typ: u8, len: u32) -> [u8; TLS_HS_HEADER_LEN] {
    let mut out = Vec::with_capacity(TLS_HS_HEADER_LEN);
    typ.encode(&mut out);
    U24(len).encode(&mut out);
    out.try_into().expect("4 bytes written")
}

pub fn decode_tls_hs_header(bytes: &[u8]) -> Option<(u8, u32)> {
    let mut r = Reader::init(bytes);
    let typ = u8::read(&mut r)?;
    let len = U24::read(&mut r)?;
    Some((typ, len.0))
}

#[allow(clippy::too_many_arguments)]
pub fn encode_dtls_hs_header(
    typ: u8,
    len: u32,
    seq: u16,
    frag_offset: u32,
    frag_len: u32,
) -> [u8; DTLS_HS_HEADER_LEN] {
    let mut out = Vec::with_capacity(DTLS_HS_HEADER_LEN);
    typ.encode(&mut out);
    U24(len).encode(&mut out);
    seq.encode(&mut out);
    U24(frag_offset).encode(&mut out);
    U24(frag_len).encode(&mut out);
    out.try_into().expect("12 bytes written")
}

pub fn decode_dtls_hs_header(bytes: &[u8]) -> Option<(u8, u32, u16, u32, u32)> {
    let mut r = Reader::init(bytes);
    let typ = u8::read(&mut r)?;
    let len = U24::read(&mut r)?;
    let seq = u16::read(&mut r)?;
    let frag_offset = U24::read(&mut r)?;
    let frag_len = U24::read(&mut r)?;
    Some((typ, len.0, seq, frag_offset.0, frag_len.0))
}
