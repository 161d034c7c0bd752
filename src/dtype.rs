//! Module `dtype` implement the native scalar datatypes understood by
//! the query and index subsystems, along with the promotion table used
//! to compare values of differing types.

use arbitrary::Arbitrary;

use std::convert::TryFrom;

use crate::{codec, Error, Result};

/// Native datatype of dataset and attribute elements. `Ref` is the
/// reference datatype used by result-view datasets, it takes no part in
/// value promotion.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Arbitrary)]
pub enum Dtype {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Ref,
}

/// Datatype class, the first byte of the self-describing type blob.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Klass {
    Int = 1,
    Uint = 2,
    Float = 3,
    Ref = 4,
}

/// Byte size of a disk reference element with the default 8-byte
/// address setting: u32 length, u64 heap address, u32 heap index.
pub const REF_DISK_SIZE: usize = 16;

impl Dtype {
    pub fn size(&self) -> usize {
        match self {
            Dtype::Int8 | Dtype::UInt8 => 1,
            Dtype::Int16 | Dtype::UInt16 => 2,
            Dtype::Int32 | Dtype::UInt32 | Dtype::Float32 => 4,
            Dtype::Int64 | Dtype::UInt64 | Dtype::Float64 => 8,
            Dtype::Ref => REF_DISK_SIZE,
        }
    }

    pub fn klass(&self) -> Klass {
        match self {
            Dtype::Int8 | Dtype::Int16 | Dtype::Int32 | Dtype::Int64 => Klass::Int,
            Dtype::UInt8 | Dtype::UInt16 | Dtype::UInt32 | Dtype::UInt64 => Klass::Uint,
            Dtype::Float32 | Dtype::Float64 => Klass::Float,
            Dtype::Ref => Klass::Ref,
        }
    }

    /// Encode the self-describing type blob, class byte followed by
    /// size byte. Two-phase, same contract as the [codec] encoders.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        if buf.len() >= 2 {
            buf[0] = self.klass() as u8;
            buf[1] = self.size() as u8;
        }
        2
    }

    pub fn decode(buf: &[u8]) -> Result<(Dtype, usize)> {
        check_remaining!(buf, 2, "dtype")?;
        let val = match (buf[0], buf[1]) {
            (1, 1) => Dtype::Int8,
            (1, 2) => Dtype::Int16,
            (1, 4) => Dtype::Int32,
            (1, 8) => Dtype::Int64,
            (2, 1) => Dtype::UInt8,
            (2, 2) => Dtype::UInt16,
            (2, 4) => Dtype::UInt32,
            (2, 8) => Dtype::UInt64,
            (3, 4) => Dtype::Float32,
            (3, 8) => Dtype::Float64,
            (4, _) => Dtype::Ref,
            (k, s) => err_at!(DecodeFail, msg: "dtype class {} size {}", k, s)?,
        };
        Ok((val, 2))
    }
}

/// Promoted comparison type. Any floating point operand promotes the
/// comparison to `F64`, otherwise the widest common signed integer is
/// picked. Pairs outside the table cannot be compared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Promoted {
    I8,
    I16,
    I32,
    I64,
    F64,
}

pub fn promote(t1: Dtype, t2: Dtype) -> Result<Promoted> {
    let rank = |t: Dtype| -> Result<usize> {
        match t {
            Dtype::Int8 => Ok(1),
            Dtype::Int16 => Ok(2),
            Dtype::Int32 => Ok(3),
            Dtype::Int64 => Ok(4),
            Dtype::Float32 | Dtype::Float64 => Ok(5),
            t => err_at!(CantCompare, msg: "no promotion for {:?}", t),
        }
    };

    let (r1, r2) = (rank(t1)?, rank(t2)?);
    let val = match usize::max(r1, r2) {
        1 => Promoted::I8,
        2 => Promoted::I16,
        3 => Promoted::I32,
        4 => Promoted::I64,
        _ => Promoted::F64,
    };
    Ok(val)
}

/// A scalar value carried in its promoted representation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pval {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
}

fn native_i64(bytes: &[u8], from: Dtype) -> Result<i64> {
    let val = match from {
        Dtype::Int8 => i8::from_le_bytes(fit(bytes)?) as i64,
        Dtype::Int16 => i16::from_le_bytes(fit(bytes)?) as i64,
        Dtype::Int32 => i32::from_le_bytes(fit(bytes)?) as i64,
        Dtype::Int64 => i64::from_le_bytes(fit(bytes)?),
        t => err_at!(CantConvert, msg: "{:?} as integer", t)?,
    };
    Ok(val)
}

fn native_f64(bytes: &[u8], from: Dtype) -> Result<f64> {
    let val = match from {
        Dtype::Float32 => f32::from_le_bytes(fit(bytes)?) as f64,
        Dtype::Float64 => f64::from_le_bytes(fit(bytes)?),
        t => native_i64(bytes, t)? as f64,
    };
    Ok(val)
}

fn fit<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    err_at!(CantConvert, <[u8; N]>::try_from(bytes))
}

/// Convert the native `from` value in `bytes` into the promoted
/// representation `to`.
pub fn to_pval(bytes: &[u8], from: Dtype, to: Promoted) -> Result<Pval> {
    if bytes.len() != from.size() {
        err_at!(CantConvert, msg: "elem {}b for {:?}", bytes.len(), from)?;
    }
    let val = match to {
        Promoted::I8 => Pval::I8(native_i64(bytes, from)? as i8),
        Promoted::I16 => Pval::I16(native_i64(bytes, from)? as i16),
        Promoted::I32 => Pval::I32(native_i64(bytes, from)? as i32),
        Promoted::I64 => Pval::I64(native_i64(bytes, from)?),
        Promoted::F64 => Pval::F64(native_f64(bytes, from)?),
    };
    Ok(val)
}

/// Convert a native value to f64, for the bitmap index threshold. The
/// supported sources are i8, i16, i32, i64, u64, f32 and f64. Other
/// types fail `BadType`.
pub fn value_as_f64(bytes: &[u8], from: Dtype) -> Result<f64> {
    let val = match from {
        Dtype::Int8 | Dtype::Int16 | Dtype::Int32 | Dtype::Int64 => {
            native_i64(bytes, from)? as f64
        }
        Dtype::UInt64 => u64::from_le_bytes(fit(bytes)?) as f64,
        Dtype::Float32 => f32::from_le_bytes(fit(bytes)?) as f64,
        Dtype::Float64 => f64::from_le_bytes(fit(bytes)?),
        t => err_at!(BadType, msg: "{:?} as f64", t)?,
    };
    Ok(val)
}

/// Encode one f64 element per value into a byte array, the persistent
/// form of the bitmap engine's key array.
pub fn f64s_to_bytes(vals: &[f64]) -> Vec<u8> {
    let mut data = vec![0; vals.len() * 8];
    for (i, val) in vals.iter().enumerate() {
        codec::encode_f64(*val, &mut data[i * 8..]);
    }
    data
}

pub fn bytes_to_f64s(data: &[u8]) -> Result<Vec<f64>> {
    if data.len() % 8 != 0 {
        err_at!(DecodeFail, msg: "f64 array {}b", data.len())?;
    }
    let mut vals = Vec::with_capacity(data.len() / 8);
    for chunk in data.chunks(8) {
        vals.push(codec::decode_f64(chunk)?.0);
    }
    Ok(vals)
}

pub fn i64s_to_bytes(vals: &[i64]) -> Vec<u8> {
    let mut data = vec![0; vals.len() * 8];
    for (i, val) in vals.iter().enumerate() {
        codec::encode_i64(*val, &mut data[i * 8..]);
    }
    data
}

pub fn bytes_to_i64s(data: &[u8]) -> Result<Vec<i64>> {
    if data.len() % 8 != 0 {
        err_at!(DecodeFail, msg: "i64 array {}b", data.len())?;
    }
    let mut vals = Vec::with_capacity(data.len() / 8);
    for chunk in data.chunks(8) {
        vals.push(codec::decode_i64(chunk)?.0);
    }
    Ok(vals)
}

pub fn u32s_to_bytes(vals: &[u32]) -> Vec<u8> {
    let mut data = vec![0; vals.len() * 4];
    for (i, val) in vals.iter().enumerate() {
        codec::encode_u32(*val, &mut data[i * 4..]);
    }
    data
}

pub fn bytes_to_u32s(data: &[u8]) -> Result<Vec<u32>> {
    if data.len() % 4 != 0 {
        err_at!(DecodeFail, msg: "u32 array {}b", data.len())?;
    }
    let mut vals = Vec::with_capacity(data.len() / 4);
    for chunk in data.chunks(4) {
        vals.push(codec::decode_u32(chunk)?.0);
    }
    Ok(vals)
}

#[cfg(test)]
#[path = "dtype_test.rs"]
mod dtype_test;
