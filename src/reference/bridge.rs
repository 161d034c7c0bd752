//! Module `bridge` implement the reference datatype's two placements.
//!
//! The *memory* placement works with in-memory [Ref] handles, the
//! *disk* placement with length prefixed global-heap locators. Both
//! convert to and from a transfer buffer holding the wire encoded
//! reference followed by an 8-byte location id, zero when none is
//! attached. Reading a disk element attaches the current container's
//! location id so a rehydrated reference can find its way back.

use std::convert::TryFrom;

use crate::{codec, store, Error, Ffile, Ref, Result};

/// Bytes the transfer buffer spends on the trailing location id.
pub const LOCID_SIZE: usize = 8;

/// One placement of the reference datatype, `Elem` is the element form
/// it stores.
pub trait Placement {
    type Elem;

    /// Size of the transfer buffer `read` would produce for `elem`.
    fn getsize(&self, elem: &Self::Elem) -> Result<usize>;

    /// Element to transfer buffer.
    fn read(&self, elem: &Self::Elem) -> Result<Vec<u8>>;

    /// Transfer buffer to element. `bg` is the background buffer
    /// naming the element being overwritten, if any.
    fn write(&self, buf: &[u8], bg: Option<&Self::Elem>) -> Result<Self::Elem>;
}

/// Memory placement, elements are [Ref] handles.
pub struct Mem;

impl Placement for Mem {
    type Elem = Ref;

    fn getsize(&self, elem: &Ref) -> Result<usize> {
        Ok(elem.encode(&mut [])? + LOCID_SIZE)
    }

    fn read(&self, elem: &Ref) -> Result<Vec<u8>> {
        let n = elem.encode(&mut [])?;
        let mut buf = vec![0; n + LOCID_SIZE];
        elem.encode(&mut buf)?;
        codec::encode_u64(elem.loc().unwrap_or(0), &mut buf[n..]);
        Ok(buf)
    }

    fn write(&self, buf: &[u8], _bg: Option<&Ref>) -> Result<Ref> {
        check_remaining!(buf, LOCID_SIZE + 2, "ref transfer buffer")?;
        let at = buf.len() - LOCID_SIZE;
        let (mut r, _) = Ref::decode(&buf[..at])?;
        let (locid, _) = codec::decode_u64(&buf[at..])?;
        if locid != 0 {
            r.attach_loc(locid)?;
        }
        Ok(r)
    }
}

/// Disk placement, elements are heap locators within one container:
/// u32 length, address-size heap address, u32 heap index.
pub struct Disk {
    file: Ffile,
}

impl Disk {
    pub fn new(file: Ffile) -> Disk {
        Disk { file }
    }

    /// Size of one disk element for the file's address-size setting.
    pub fn elem_size(&self) -> Result<usize> {
        Ok(4 + self.file.rd()?.addr_size() + 4)
    }

    fn decode_locator(&self, elem: &[u8]) -> Result<(u32, u64, u32)> {
        let addr_size = self.file.rd()?.addr_size();
        check_remaining!(elem, 4 + addr_size + 4, "disk ref element")?;
        let (len, mut off) = codec::decode_u32(elem)?;
        let (haddr, n) = codec::decode_addr(&elem[off..], addr_size)?;
        off += n;
        let (hidx, _) = codec::decode_u32(&elem[off..])?;
        Ok((len, haddr, hidx))
    }
}

impl Placement for Disk {
    type Elem = Vec<u8>;

    fn getsize(&self, elem: &Vec<u8>) -> Result<usize> {
        let (len, _, _) = self.decode_locator(elem)?;
        Ok(len as usize)
    }

    fn read(&self, elem: &Vec<u8>) -> Result<Vec<u8>> {
        let (len, haddr, hidx) = self.decode_locator(elem)?;
        let payload = self.file.rd()?.heap_read(haddr, hidx)?;
        if payload.len() + LOCID_SIZE != len as usize {
            err_at!(DecodeFail, msg: "heap payload {}b of {}b", payload.len(), len)?;
        }
        let locid = store::ensure_loc(&self.file)?;
        let mut buf = payload;
        let at = buf.len();
        buf.resize(at + LOCID_SIZE, 0);
        codec::encode_u64(locid, &mut buf[at..]);
        Ok(buf)
    }

    fn write(&self, buf: &[u8], bg: Option<&Vec<u8>>) -> Result<Vec<u8>> {
        check_remaining!(buf, LOCID_SIZE + 2, "ref transfer buffer")?;

        // free the heap object the background buffer names
        if let Some(bg) = bg {
            if bg.iter().any(|b| *b != 0) {
                let (_, haddr, hidx) = self.decode_locator(bg)?;
                self.file.wr()?.heap_remove(haddr, hidx)?;
            }
        }

        let payload = buf[..buf.len() - LOCID_SIZE].to_vec();
        let len = err_at!(FailConvert, u32::try_from(buf.len()))?;
        let (haddr, hidx) = self.file.wr()?.heap_insert(payload);

        let addr_size = self.file.rd()?.addr_size();
        let mut elem = vec![0; 4 + addr_size + 4];
        let mut off = codec::encode_u32(len, &mut elem);
        off += codec::encode_addr(haddr, addr_size, &mut elem[off..])?;
        codec::encode_u32(hidx, &mut elem[off..]);
        Ok(elem)
    }
}

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;
