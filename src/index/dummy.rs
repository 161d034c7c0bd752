//! Module `dummy` implement the full-copy baseline index plug-in.
//!
//! The plug-in keeps an anonymous duplicate of the dataset and answers
//! a query by scanning the duplicate element-wise. Its metadata blob is
//! the 8-byte address of the duplicate.

use log::debug;

use crate::{
    codec,
    index::{scan_select, Class, IndexProps, Indexer, Plugin, PLUGIN_DUMMY},
    Addr, Dataspace, Dtype, Error, Ffile, Qref, Result,
};

pub struct Dummy;

struct DummyIdx {
    file: Ffile,
    dset: Addr,
    dtype: Dtype,
    anon: Addr,
}

impl DummyIdx {
    fn metadata(&self) -> Vec<u8> {
        let mut buf = vec![0; 8];
        codec::encode_u64(self.anon, &mut buf);
        buf
    }
}

impl Plugin for Dummy {
    fn to_id(&self) -> u32 {
        PLUGIN_DUMMY
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
        let (dtype, space, data) = {
            let c = file.rd()?;
            let d = c.dataset(dset)?;
            let data = match props.is_read_on_create() {
                true => Some(c.read_dataset(dset)?),
                false => None,
            };
            (d.dtype, d.space.clone(), data)
        };

        let anon = {
            let mut c = file.wr()?;
            let anon = c.create_dataset_anon(dtype, space.clone())?;
            if let Some(data) = data {
                if let Err(err) = c.write_dataset(anon, &data) {
                    c.decr_refn(anon).ok();
                    return Err(err);
                }
            }
            c.incr_refn(anon)?;
            anon
        };

        let idx = DummyIdx {
            file: file.clone(),
            dset,
            dtype,
            anon,
        };
        let metadata = idx.metadata();
        Ok((Box::new(idx), metadata))
    }

    fn open(&self, file: &Ffile, dset: Addr, metadata: &[u8]) -> Result<Box<dyn Indexer>> {
        let (anon, _) = codec::decode_u64(metadata)?;
        let dtype = {
            let c = file.rd()?;
            if !c.exists(anon) {
                err_at!(CantOpen, msg: "anonymous dataset {}", anon)?;
            }
            c.dataset(dset)?.dtype
        };
        Ok(Box::new(DummyIdx {
            file: file.clone(),
            dset,
            dtype,
            anon,
        }))
    }

    fn remove(&self, file: &Ffile, metadata: &[u8]) -> Result<()> {
        let (anon, _) = codec::decode_u64(metadata)?;
        file.wr()?.decr_refn(anon)?;
        Ok(())
    }
}

impl Indexer for DummyIdx {
    fn pre_update(&mut self, space: &Dataspace) -> Result<()> {
        debug!(target: "dummyx", "pre-update {} points on {}", space.npoints(), self.dset);
        Ok(())
    }

    /// Scatter the new bytes into a full-extent staging copy, then
    /// rewrite the duplicate wholesale. The full write is deliberate,
    /// simplicity over incrementality.
    fn post_update(&mut self, buf: &[u8], space: &Dataspace) -> Result<()> {
        let esz = self.dtype.size();
        let mut staging = self.file.rd()?.read_dataset(self.anon)?;
        let points = space.linear_points();
        if buf.len() != points.len() * esz {
            err_at!(InvalidInput, msg: "update {}b over {} points", buf.len(), points.len())?;
        }
        for (i, point) in points.into_iter().enumerate() {
            let off = point as usize * esz;
            staging[off..off + esz].copy_from_slice(&buf[i * esz..(i + 1) * esz]);
        }
        self.file.wr()?.write_dataset(self.anon, &staging)
    }

    fn query(&mut self, space: &Dataspace, q: &Qref) -> Result<Dataspace> {
        let data = self.file.rd()?.read_dataset(self.anon)?;
        scan_select(space, self.dtype, &data, q)
    }

    fn refresh(&mut self) -> Result<Vec<u8>> {
        Ok(self.metadata())
    }

    fn get_size(&self) -> Result<u64> {
        self.file.rd()?.storage_size(self.anon)
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "dummy_test.rs"]
mod dummy_test;
