//! Module `bitmap` implement the binned bitmap index plug-in over the
//! [engine].
//!
//! Each indexed dataset gets a deterministic column identifier derived
//! from its full path by the djb2 hash. The built index persists as
//! three anonymous opaque datasets, keys, offsets and bitmaps, and the
//! metadata blob is the concatenation of their three addresses.

use log::debug;

use std::sync::Arc;

use crate::{
    codec, dtype,
    index::{
        engine::{self, Fcmp, Ftype},
        Class, IndexProps, Indexer, Plugin, PLUGIN_BITMAP,
    },
    query::Qtype,
    Addr, Dataspace, Dtype, Error, Ffile, Qref, Query, Result,
};

pub struct Binned;

struct BinnedIdx {
    file: Ffile,
    dset: Addr,
    column: String,
    dtype: Dtype,
    keys_ds: Addr,    // zero while unbuilt
    offsets_ds: Addr,
    bitmaps_ds: Addr,
}

/// The djb2 string hash.
fn djb2(text: &str) -> u32 {
    let mut h: u32 = 5381;
    for b in text.bytes() {
        h = h.wrapping_mul(33).wrapping_add(b as u32);
    }
    h
}

/// Column identifier of a dataset path.
pub fn column_name(path: &str) -> String {
    format!("array{}", djb2(path))
}

fn to_ftype(dtype: Dtype) -> Result<Ftype> {
    let val = match dtype {
        Dtype::Int8 => Ftype::Byte,
        Dtype::Int16 => Ftype::Short,
        Dtype::Int32 => Ftype::Int,
        Dtype::Int64 => Ftype::Long,
        Dtype::UInt64 => Ftype::ULong,
        Dtype::Float32 => Ftype::Float,
        Dtype::Float64 => Ftype::Double,
        dtype => err_at!(BadType, msg: "{:?} has no bitmap column type", dtype)?,
    };
    Ok(val)
}

fn to_fcmp(q: &Query) -> Result<Fcmp> {
    use crate::MatchOp;

    let val = match q.match_op()? {
        MatchOp::Eq => Fcmp::Eq,
        MatchOp::Neq => Fcmp::Neq,
        MatchOp::Lt => Fcmp::Lt,
        MatchOp::Gt => Fcmp::Gt,
    };
    Ok(val)
}

impl BinnedIdx {
    fn metadata(&self) -> Vec<u8> {
        let mut buf = vec![0; 24];
        codec::encode_u64(self.keys_ds, &mut buf);
        codec::encode_u64(self.offsets_ds, &mut buf[8..]);
        codec::encode_u64(self.bitmaps_ds, &mut buf[16..]);
        buf
    }

    /// Store one persistence array into a fresh anonymous opaque
    /// dataset, replacing `old` when the index is rebuilt.
    fn store_array(&self, old: Addr, bytes: Vec<u8>) -> Result<Addr> {
        let mut c = self.file.wr()?;
        if old != 0 {
            c.decr_refn(old)?;
        }
        let space = Dataspace::new(vec![bytes.len() as u64])?;
        let anon = c.create_dataset_anon(Dtype::UInt8, space)?;
        if let Err(err) = c.write_dataset(anon, &bytes) {
            c.decr_refn(anon).ok();
            return Err(err);
        }
        c.incr_refn(anon)?;
        Ok(anon)
    }

    /// Register the dataset content as a column and bin it, then
    /// persist the deconstructed arrays. On failure every anonymous
    /// dataset created along the way is discarded, leaving the dataset
    /// un-indexed.
    fn build(&mut self, data: &[u8]) -> Result<()> {
        let esz = self.dtype.size();
        let mut values = Vec::with_capacity(data.len() / esz);
        for elem in data.chunks(esz) {
            values.push(dtype::value_as_f64(elem, self.dtype)?);
        }
        engine::register_array(&self.column, to_ftype(self.dtype)?, values)?;
        engine::build_index(&self.column)?;
        let (keys, offsets, bitmaps) = engine::deconstruct_index(&self.column)?;
        debug!(
            target: "bitmapx",
            "{:?} nkeys:{} noffsets:{} nbitmaps:{}",
            self.column, keys.len(), offsets.len(), bitmaps.len()
        );

        let undo = |created: &[Addr]| {
            if let Ok(mut c) = self.file.wr() {
                for addr in created.iter() {
                    c.decr_refn(*addr).ok();
                }
            }
        };

        let keys_ds = self.store_array(self.keys_ds, dtype::f64s_to_bytes(&keys))?;
        let offsets_ds = match self.store_array(self.offsets_ds, dtype::i64s_to_bytes(&offsets)) {
            Ok(addr) => addr,
            Err(err) => {
                undo(&[keys_ds]);
                return Err(err);
            }
        };
        let bitmaps_ds = match self.store_array(self.bitmaps_ds, dtype::u32s_to_bytes(&bitmaps)) {
            Ok(addr) => addr,
            Err(err) => {
                undo(&[keys_ds, offsets_ds]);
                return Err(err);
            }
        };

        self.keys_ds = keys_ds;
        self.offsets_ds = offsets_ds;
        self.bitmaps_ds = bitmaps_ds;
        Ok(())
    }

    /// Read the three persisted arrays back and register the column
    /// index-only, with a reader slicing the in-memory words.
    fn reconstruct(&self) -> Result<()> {
        let c = self.file.rd()?;
        let keys = dtype::bytes_to_f64s(&c.read_dataset(self.keys_ds)?)?;
        let offsets = dtype::bytes_to_i64s(&c.read_dataset(self.offsets_ds)?)?;
        let words = Arc::new(dtype::bytes_to_u32s(&c.read_dataset(self.bitmaps_ds)?)?);
        let nrows = c.dataset(self.dset)?.space.extent_npoints();

        let reader: engine::Reader = {
            let words = Arc::clone(&words);
            Box::new(move |start: u64, count: u64| {
                let (start, count) = (start as usize, count as usize);
                if start + count > words.len() {
                    err_at!(InvalidInput, msg: "words [{}+{}] of {}", start, count, words.len())
                } else {
                    Ok(words[start..start + count].to_vec())
                }
            })
        };
        engine::register_array_index_only(
            &self.column,
            to_ftype(self.dtype)?,
            nrows,
            keys,
            offsets,
            reader,
        )
    }
}

impl Plugin for Binned {
    fn to_id(&self) -> u32 {
        PLUGIN_BITMAP
    }

    fn to_class(&self) -> Class {
        Class::Data
    }

    fn create(
        &self,
        file: &Ffile,
        dset: Addr,
        props: &IndexProps,
    ) -> Result<(Box<dyn Indexer>, Vec<u8>)> {
        let (column, dtype, data) = {
            let c = file.rd()?;
            let path = c.path_of(dset)?;
            let d = c.dataset(dset)?;
            let data = match props.is_read_on_create() {
                true => Some(c.read_dataset(dset)?),
                false => None,
            };
            (column_name(&path), d.dtype, data)
        };
        to_ftype(dtype)?;

        let mut idx = BinnedIdx {
            file: file.clone(),
            dset,
            column,
            dtype,
            keys_ds: 0,
            offsets_ds: 0,
            bitmaps_ds: 0,
        };
        if let Some(data) = data {
            idx.build(&data)?;
        }
        let metadata = idx.metadata();
        Ok((Box::new(idx), metadata))
    }

    fn open(&self, file: &Ffile, dset: Addr, metadata: &[u8]) -> Result<Box<dyn Indexer>> {
        check_remaining!(metadata, 24, "bitmap metadata")?;
        let (keys_ds, _) = codec::decode_u64(metadata)?;
        let (offsets_ds, _) = codec::decode_u64(&metadata[8..])?;
        let (bitmaps_ds, _) = codec::decode_u64(&metadata[16..])?;

        let (column, dtype) = {
            let c = file.rd()?;
            let path = c.path_of(dset)?;
            (column_name(&path), c.dataset(dset)?.dtype)
        };
        let idx = BinnedIdx {
            file: file.clone(),
            dset,
            column,
            dtype,
            keys_ds,
            offsets_ds,
            bitmaps_ds,
        };
        if keys_ds != 0 && offsets_ds != 0 && bitmaps_ds != 0 {
            idx.reconstruct()?;
        }
        Ok(Box::new(idx))
    }

    fn remove(&self, file: &Ffile, metadata: &[u8]) -> Result<()> {
        check_remaining!(metadata, 24, "bitmap metadata")?;
        let mut c = file.wr()?;
        for off in [0_usize, 8, 16].iter() {
            let (addr, _) = codec::decode_u64(&metadata[*off..])?;
            if addr != 0 {
                c.decr_refn(addr)?;
            }
        }
        Ok(())
    }
}

impl Indexer for BinnedIdx {
    fn pre_update(&mut self, space: &Dataspace) -> Result<()> {
        debug!(target: "bitmapx", "pre-update {} points on {}", space.npoints(), self.dset);
        Ok(())
    }

    /// Scatter the new bytes into a full-extent staging copy of the
    /// dataset, then rebuild the whole index.
    fn post_update(&mut self, buf: &[u8], space: &Dataspace) -> Result<()> {
        let esz = self.dtype.size();
        let mut staging = self.file.rd()?.read_dataset(self.dset)?;
        let points = space.linear_points();
        if buf.len() != points.len() * esz {
            err_at!(InvalidInput, msg: "update {}b over {} points", buf.len(), points.len())?;
        }
        for (i, point) in points.into_iter().enumerate() {
            let off = point as usize * esz;
            staging[off..off + esz].copy_from_slice(&buf[i * esz..(i + 1) * esz]);
        }
        self.build(&staging)
    }

    /// Queries must be a singleton data-element leaf, the threshold is
    /// the leaf's value as f64.
    fn query(&mut self, space: &Dataspace, q: &Qref) -> Result<Dataspace> {
        if q.is_combined() {
            err_at!(BadType, msg: "combined queries are not supported")?;
        }
        if q.qtype() != Qtype::DataElem {
            err_at!(BadType, msg: "{:?} leaf on a data index", q.qtype())?;
        }
        if !engine::is_registered(&self.column)? {
            err_at!(CantOpen, msg: "column {:?} not built", self.column)?;
        }
        let cmp = to_fcmp(q)?;
        let threshold = dtype::value_as_f64(q.value_bytes()?, q.value_dtype()?)?;

        let mut pick = engine::selection_osr(&self.column, cmp, threshold);
        pick.evaluate()?;

        let mut out = space.clone();
        out.select_none();
        let ones = vec![1; space.rank()];
        for linear in pick.coordinates()?.iter() {
            let coords = out.linear_to_coords(*linear);
            out.select_or(&coords, &ones)?;
        }
        Ok(out)
    }

    fn refresh(&mut self) -> Result<Vec<u8>> {
        Ok(self.metadata())
    }

    fn get_size(&self) -> Result<u64> {
        let c = self.file.rd()?;
        let mut size = 0;
        for addr in [self.keys_ds, self.offsets_ds, self.bitmaps_ds].iter() {
            if *addr != 0 {
                size += c.storage_size(*addr)?;
            }
        }
        Ok(size)
    }

    fn close(self: Box<Self>) -> Result<()> {
        engine::drop_column(&self.column)
    }
}

#[cfg(test)]
#[path = "bitmap_test.rs"]
mod bitmap_test;
