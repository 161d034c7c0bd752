//! Module `compat` implement the legacy heap backed reference
//! encodings, types `Object1` and `Region1`. The encoded form has no
//! version byte, it is a length prefixed fixed-width heap locator and
//! the reference payload itself lives in the container's global heap.

use std::convert::TryFrom;

use crate::{codec, reference::Rtype, Error, Ffile, Ref, Result};

/// Encoded size of a legacy locator for the file's address-size
/// setting: u32 length, heap address, u32 heap index.
pub fn locator_size(addr_size: usize) -> usize {
    4 + addr_size + 4
}

/// Encode a reference through the heap. Two-phase: with an
/// insufficient buffer nothing is inserted into the heap and the
/// required size is returned. Only object and region references have a
/// legacy form.
pub fn encode_compat(r: &Ref, file: &Ffile, buf: &mut [u8]) -> Result<usize> {
    match r.rtype() {
        Rtype::Object2 | Rtype::Region2 => (),
        rtype => err_at!(Unsupported, msg: "no legacy form for {:?}", rtype)?,
    }

    let addr_size = file.rd()?.addr_size();
    let n = locator_size(addr_size);
    if buf.len() < n {
        return Ok(n);
    }

    let payload = {
        let m = r.encode(&mut [])?;
        let mut payload = vec![0; m];
        r.encode(&mut payload)?;
        payload
    };
    let plen = err_at!(FailConvert, u32::try_from(payload.len()))?;
    let (haddr, hidx) = file.wr()?.heap_insert(payload);

    let mut off = codec::encode_u32(plen, buf);
    off += codec::encode_addr(haddr, addr_size, &mut buf[off..])?;
    off += codec::encode_u32(hidx, &mut buf[off..]);
    debug_assert_eq!(off, n);
    Ok(n)
}

/// Decode a legacy locator and rehydrate the reference from the heap.
/// `rtype` names the expected legacy type, it must agree with the heap
/// payload.
pub fn decode_compat(buf: &[u8], file: &Ffile, rtype: Rtype) -> Result<(Ref, usize)> {
    let addr_size = file.rd()?.addr_size();
    let n = locator_size(addr_size);
    check_remaining!(buf, n, "legacy locator")?;

    let (plen, mut off) = codec::decode_u32(buf)?;
    let (haddr, m) = codec::decode_addr(&buf[off..], addr_size)?;
    off += m;
    let (hidx, m) = codec::decode_u32(&buf[off..])?;
    off += m;

    let payload = file.rd()?.heap_read(haddr, hidx)?;
    if payload.len() != plen as usize {
        err_at!(DecodeFail, msg: "heap payload {}b of {}b", payload.len(), plen)?;
    }
    let (r, _) = Ref::decode(&payload)?;
    match (rtype, r.rtype()) {
        (Rtype::Object1, Rtype::Object2) => (),
        (Rtype::Region1, Rtype::Region2) => (),
        (want, got) => err_at!(BadType, msg: "legacy {:?} holds {:?}", want, got)?,
    }
    Ok((r, off))
}

#[cfg(test)]
#[path = "compat_test.rs"]
mod compat_test;
