//! Module `codec` implement little-endian wire primitives.
//!
//! Every encoder follows the same two-phase contract: called with a
//! buffer that is too small (typically empty, as a size probe) it
//! returns the required byte count and writes nothing; called with a
//! large enough buffer it fills exactly that many bytes and returns the
//! count. Decoders consume exactly the bytes they claim and fail with
//! `DecodeFail` on truncated input.

use crate::{Error, Result};

macro_rules! fixed_codec {
    ($ty:ty, $enc:ident, $dec:ident) => {
        pub fn $enc(val: $ty, buf: &mut [u8]) -> usize {
            let n = std::mem::size_of::<$ty>();
            if buf.len() >= n {
                buf[..n].copy_from_slice(&val.to_le_bytes());
            }
            n
        }

        pub fn $dec(buf: &[u8]) -> Result<($ty, usize)> {
            let n = std::mem::size_of::<$ty>();
            check_remaining!(buf, n, stringify!($dec))?;
            let mut scratch = [0_u8; std::mem::size_of::<$ty>()];
            scratch.copy_from_slice(&buf[..n]);
            Ok((<$ty>::from_le_bytes(scratch), n))
        }
    };
}

fixed_codec!(u16, encode_u16, decode_u16);
fixed_codec!(u32, encode_u32, decode_u32);
fixed_codec!(u64, encode_u64, decode_u64);
fixed_codec!(i16, encode_i16, decode_i16);
fixed_codec!(i32, encode_i32, decode_i32);
fixed_codec!(i64, encode_i64, decode_i64);

/// Encode `val` into exactly `width` little-endian bytes, width must be
/// within 1..=8 and `val` must fit the width.
pub fn encode_uvar(val: u64, width: usize, buf: &mut [u8]) -> Result<usize> {
    if width < 1 || width > 8 {
        err_at!(InvalidInput, msg: "uvar width {}", width)?;
    }
    if width < 8 && (val >> (width * 8)) != 0 {
        err_at!(EncodeFail, msg: "value {} overflows width {}", val, width)?;
    }
    if buf.len() >= width {
        buf[..width].copy_from_slice(&val.to_le_bytes()[..width]);
    }
    Ok(width)
}

/// Decode `width` little-endian bytes, the mirror of [encode_uvar].
pub fn decode_uvar(buf: &[u8], width: usize) -> Result<(u64, usize)> {
    if width < 1 || width > 8 {
        err_at!(InvalidInput, msg: "uvar width {}", width)?;
    }
    check_remaining!(buf, width, "decode_uvar")?;
    let mut scratch = [0_u8; 8];
    scratch[..width].copy_from_slice(&buf[..width]);
    Ok((u64::from_le_bytes(scratch), width))
}

fn width_of(val: u64) -> usize {
    match val {
        0 => 1,
        val => ((64 - val.leading_zeros() as usize) + 7) / 8,
    }
}

/// Encode a 64-bit value as 1-byte length followed by that many value
/// bytes, the length is the minimal width holding the value.
pub fn encode_len64(val: u64, buf: &mut [u8]) -> usize {
    let width = width_of(val);
    if buf.len() >= width + 1 {
        buf[0] = width as u8;
        buf[1..=width].copy_from_slice(&val.to_le_bytes()[..width]);
    }
    width + 1
}

pub fn decode_len64(buf: &[u8]) -> Result<(u64, usize)> {
    check_remaining!(buf, 1, "decode_len64")?;
    let width = buf[0] as usize;
    if width < 1 || width > 8 {
        err_at!(DecodeFail, msg: "len64 width {}", width)?;
    }
    let (val, _) = decode_uvar(&buf[1..], width)?;
    Ok((val, width + 1))
}

/// Encode a container address, the width comes from the container's
/// address-size setting and must be 2, 4 or 8.
pub fn encode_addr(addr: u64, addr_size: usize, buf: &mut [u8]) -> Result<usize> {
    match addr_size {
        2 | 4 | 8 => encode_uvar(addr, addr_size, buf),
        _ => err_at!(InvalidInput, msg: "address size {}", addr_size),
    }
}

pub fn decode_addr(buf: &[u8], addr_size: usize) -> Result<(u64, usize)> {
    match addr_size {
        2 | 4 | 8 => decode_uvar(buf, addr_size),
        _ => err_at!(InvalidInput, msg: "address size {}", addr_size),
    }
}

/// Encode a container length, the width comes from the container's
/// length-size setting and must be 2, 4 or 8.
pub fn encode_length(len: u64, len_size: usize, buf: &mut [u8]) -> Result<usize> {
    match len_size {
        2 | 4 | 8 => encode_uvar(len, len_size, buf),
        _ => err_at!(InvalidInput, msg: "length size {}", len_size),
    }
}

pub fn decode_length(buf: &[u8], len_size: usize) -> Result<(u64, usize)> {
    match len_size {
        2 | 4 | 8 => decode_uvar(buf, len_size),
        _ => err_at!(InvalidInput, msg: "length size {}", len_size),
    }
}

/// Strict upper bound on encoded string length.
pub const MAX_STRING_LEN: usize = 1 << 15;

/// Encode a string as 16-bit unsigned length followed by the raw bytes,
/// no terminating NUL. Strings of [MAX_STRING_LEN] bytes and beyond are
/// refused.
pub fn encode_string(val: &str, buf: &mut [u8]) -> Result<usize> {
    let n = val.len();
    if n >= MAX_STRING_LEN {
        err_at!(InvalidInput, msg: "string too long {}", n)?;
    }
    if buf.len() >= n + 2 {
        encode_u16(n as u16, buf);
        buf[2..n + 2].copy_from_slice(val.as_bytes());
    }
    Ok(n + 2)
}

pub fn decode_string(buf: &[u8]) -> Result<(String, usize)> {
    let (n, _) = decode_u16(buf)?;
    let n = n as usize;
    check_remaining!(buf, n + 2, "decode_string")?;
    let val = err_at!(DecodeFail, std::str::from_utf8(&buf[2..n + 2]))?;
    Ok((val.to_string(), n + 2))
}

/// Encode a double-precision float as its 8-byte little-endian bit
/// pattern.
pub fn encode_f64(val: f64, buf: &mut [u8]) -> usize {
    encode_u64(val.to_bits(), buf)
}

pub fn decode_f64(buf: &[u8]) -> Result<(f64, usize)> {
    let (bits, n) = decode_u64(buf)?;
    Ok((f64::from_bits(bits), n))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
