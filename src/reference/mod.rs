//! Module `reference` implement typed references to container objects.
//!
//! A reference names an object, a sub-array region of a dataset, or a
//! named attribute, optionally in an external container. References
//! encode to a stable little-endian wire format, refer to
//! [Ref::encode]. Legacy heap backed encodings live in [compat], the
//! memory/disk datatype placements live in [bridge].
//!
//! A reference materialized from disk carries a location id and holds
//! exactly one strong count on it for its whole lifetime, released on
//! drop.

use std::convert::TryFrom;

use crate::{codec, store, Addr, Dataspace, Error, Ffile, Result};

pub mod bridge;
pub mod compat;

/// Protocol version of the wire encoding.
pub const ENCODE_VERSION: u8 = 1;

/// Upper bound on attribute names held by a reference.
pub const MAX_ATTR_NAME: usize = 65536;

/// Reference type discriminant as it appears on the wire. `Object1` and
/// `Region1` are the legacy heap backed types, readable through
/// [compat] only.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rtype {
    Object1 = 0,
    Region1 = 1,
    Object2 = 2,
    Region2 = 3,
    Attr = 4,
}

impl Rtype {
    fn from_code(code: u8) -> Result<Rtype> {
        let val = match code {
            0 => Rtype::Object1,
            1 => Rtype::Region1,
            2 => Rtype::Object2,
            3 => Rtype::Region2,
            4 => Rtype::Attr,
            code => err_at!(DecodeFail, msg: "reference type {}", code)?,
        };
        Ok(val)
    }
}

#[derive(Debug)]
enum Rkind {
    Object { addr: Addr },
    Region { addr: Addr, space: Dataspace },
    Attr { addr: Addr, name: String },
}

/// Typed reference. Create with the `create_*` constructors, duplicate
/// with [Ref::copy], destroy by dropping.
#[derive(Debug)]
pub struct Ref {
    kind: Rkind,
    filename: Option<String>,
    loc: Option<u64>,
}

impl Drop for Ref {
    fn drop(&mut self) {
        if let Some(id) = self.loc.take() {
            store::decr_loc(id).ok();
        }
    }
}

impl Ref {
    /// Reference the object at `name` under `loc`.
    pub fn create_object(file: &Ffile, loc: Addr, name: &str) -> Result<Ref> {
        let addr = file.rd()?.resolve(loc, name)?;
        Ok(Ref {
            kind: Rkind::Object { addr },
            filename: None,
            loc: None,
        })
    }

    /// Reference a region of the dataset at `name` under `loc`. The
    /// dataspace must carry a selection.
    pub fn create_region(
        file: &Ffile,
        loc: Addr,
        name: &str,
        space: &Dataspace,
    ) -> Result<Ref> {
        if !space.is_selected() {
            err_at!(InvalidInput, msg: "no selection on dataspace")?;
        }
        let addr = file.rd()?.resolve(loc, name)?;
        Ok(Ref {
            kind: Rkind::Region {
                addr,
                space: space.clone(),
            },
            filename: None,
            loc: None,
        })
    }

    /// Reference the attribute `attr_name` on the object at `name`
    /// under `loc`.
    pub fn create_attr(
        file: &Ffile,
        loc: Addr,
        name: &str,
        attr_name: &str,
    ) -> Result<Ref> {
        if attr_name.len() >= MAX_ATTR_NAME {
            err_at!(InvalidInput, msg: "attribute name {}b", attr_name.len())?;
        }
        let addr = {
            let c = file.rd()?;
            let addr = c.resolve(loc, name)?;
            c.read_attr(addr, attr_name)?;
            addr
        };
        Ok(Ref {
            kind: Rkind::Attr {
                addr,
                name: attr_name.to_string(),
            },
            filename: None,
            loc: None,
        })
    }

    /// External variants carry the source container's opened file name.
    pub fn create_ext_object(file: &Ffile, loc: Addr, name: &str) -> Result<Ref> {
        let mut r = Ref::create_object(file, loc, name)?;
        r.filename = Some(file.to_name()?);
        Ok(r)
    }

    pub fn create_ext_region(
        file: &Ffile,
        loc: Addr,
        name: &str,
        space: &Dataspace,
    ) -> Result<Ref> {
        let mut r = Ref::create_region(file, loc, name, space)?;
        r.filename = Some(file.to_name()?);
        Ok(r)
    }

    pub fn create_ext_attr(
        file: &Ffile,
        loc: Addr,
        name: &str,
        attr_name: &str,
    ) -> Result<Ref> {
        let mut r = Ref::create_attr(file, loc, name, attr_name)?;
        r.filename = Some(file.to_name()?);
        Ok(r)
    }

    pub fn rtype(&self) -> Rtype {
        match &self.kind {
            Rkind::Object { .. } => Rtype::Object2,
            Rkind::Region { .. } => Rtype::Region2,
            Rkind::Attr { .. } => Rtype::Attr,
        }
    }

    pub fn addr(&self) -> Addr {
        match &self.kind {
            Rkind::Object { addr } => *addr,
            Rkind::Region { addr, .. } => *addr,
            Rkind::Attr { addr, .. } => *addr,
        }
    }

    pub fn loc(&self) -> Option<u64> {
        self.loc
    }

    /// Attach a location id, taking one strong count on it. An earlier
    /// attachment is released first.
    pub fn attach_loc(&mut self, id: u64) -> Result<()> {
        store::incr_loc(id)?;
        if let Some(old) = self.loc.replace(id) {
            store::decr_loc(old)?;
        }
        Ok(())
    }

    /// References are equal when their types match and they name the
    /// same object, for regions the selection extents must also match,
    /// for attributes the attribute names.
    pub fn equal(&self, other: &Ref) -> bool {
        match (&self.kind, &other.kind) {
            (Rkind::Object { addr: a }, Rkind::Object { addr: b }) => a == b,
            (
                Rkind::Region { addr: a, space: sa },
                Rkind::Region { addr: b, space: sb },
            ) => a == b && sa.dims() == sb.dims(),
            (
                Rkind::Attr { addr: a, name: na },
                Rkind::Attr { addr: b, name: nb },
            ) => a == b && na == nb,
            _ => false,
        }
    }

    /// Deep copy, the copy takes its own strong count on the attached
    /// location.
    pub fn copy(&self) -> Result<Ref> {
        let kind = match &self.kind {
            Rkind::Object { addr } => Rkind::Object { addr: *addr },
            Rkind::Region { addr, space } => Rkind::Region {
                addr: *addr,
                space: space.clone(),
            },
            Rkind::Attr { addr, name } => Rkind::Attr {
                addr: *addr,
                name: name.clone(),
            },
        };
        if let Some(id) = self.loc {
            store::incr_loc(id)?;
        }
        Ok(Ref {
            kind,
            filename: self.filename.clone(),
            loc: self.loc,
        })
    }

    /// A newly-copied dataspace with the reference's selection applied,
    /// valid only on region references.
    pub fn get_region(&self) -> Result<Dataspace> {
        match &self.kind {
            Rkind::Region { space, .. } => Ok(space.clone()),
            _ => err_at!(BadType, msg: "{:?} is not a region reference", self.rtype()),
        }
    }

    /// File name of the container this reference points into, either
    /// the recorded external file name or the attached location's.
    pub fn get_file_name(&self) -> Result<String> {
        match &self.filename {
            Some(name) => Ok(name.clone()),
            None => match self.loc {
                Some(id) => store::loc_file(id)?.to_name(),
                None => err_at!(NotFound, msg: "reference has no file"),
            },
        }
    }

    /// Path of the referenced object within `file`.
    pub fn get_obj_name(&self, file: &Ffile) -> Result<String> {
        file.rd()?.path_of(self.addr())
    }

    pub fn get_attr_name(&self) -> Result<String> {
        match &self.kind {
            Rkind::Attr { name, .. } => Ok(name.clone()),
            _ => err_at!(BadType, msg: "{:?} is not an attribute reference", self.rtype()),
        }
    }

    /// Serialize into the version-1 wire format. Two-phase, same
    /// contract as the [codec] encoders: version byte, type byte,
    /// 8-byte LE object address, then the type specific payload.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let payload = match &self.kind {
            Rkind::Object { .. } => 0,
            Rkind::Region { space, .. } => 4 + space.encode(&mut [])?,
            Rkind::Attr { name, .. } => {
                if name.len() >= codec::MAX_STRING_LEN {
                    err_at!(EncodeFail, msg: "attribute name {}b", name.len())?;
                }
                2 + name.len()
            }
        };
        let n = 2 + 8 + payload;
        if buf.len() < n {
            return Ok(n);
        }

        buf[0] = ENCODE_VERSION;
        buf[1] = self.rtype() as u8;
        let mut off = 2;
        off += codec::encode_u64(self.addr(), &mut buf[off..]);
        match &self.kind {
            Rkind::Object { .. } => (),
            Rkind::Region { space, .. } => {
                let m = space.encode(&mut [])?;
                let m = err_at!(FailConvert, u32::try_from(m))?;
                off += codec::encode_u32(m, &mut buf[off..]);
                off += space.encode(&mut buf[off..])?;
            }
            Rkind::Attr { name, .. } => {
                off += codec::encode_string(name, &mut buf[off..])?;
            }
        }
        debug_assert_eq!(off, n);
        Ok(n)
    }

    /// The mirror of [Ref::encode]. The decoded reference has no
    /// attached location, the datatype bridge attaches one later.
    pub fn decode(buf: &[u8]) -> Result<(Ref, usize)> {
        check_remaining!(buf, 2, "ref header")?;
        if buf[0] != ENCODE_VERSION {
            err_at!(DecodeFail, msg: "protocol version {}", buf[0])?;
        }
        let rtype = Rtype::from_code(buf[1])?;
        let mut off = 2;
        let (addr, n) = codec::decode_u64(&buf[off..])?;
        off += n;
        let kind = match rtype {
            Rtype::Object2 => Rkind::Object { addr },
            Rtype::Region2 => {
                let (m, n) = codec::decode_u32(&buf[off..])?;
                off += n;
                let m = m as usize;
                check_remaining!(buf, off + m, "ref selection")?;
                let (space, k) = Dataspace::decode(&buf[off..off + m])?;
                if k != m {
                    err_at!(DecodeFail, msg: "selection {}b of {}b", k, m)?;
                }
                off += m;
                Rkind::Region { addr, space }
            }
            Rtype::Attr => {
                let (name, n) = codec::decode_string(&buf[off..])?;
                off += n;
                Rkind::Attr { addr, name }
            }
            rtype => err_at!(Unsupported, msg: "legacy type {:?}", rtype)?,
        };
        let r = Ref {
            kind,
            filename: None,
            loc: None,
        };
        Ok((r, off))
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
