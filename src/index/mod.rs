//! Module `index` implement the index plug-in framework.
//!
//! A process-wide registry maps plug-in ids to [Plugin] factories. Per
//! dataset, the container persists an index record naming the plug-in
//! and an opaque metadata blob; by policy the blob holds addresses of
//! anonymous datasets carrying the plug-in's persistent arrays, so
//! removing an index is a refcount decrement per array.
//!
//! Construction on a dataset is at-most-one-at-a-time, a concurrent
//! create is refused with `CantCreate`. Dataset writes go through
//! [write_dataset], which brackets the store write with the plug-in's
//! `pre_update`/`post_update` hooks.

use lazy_static::lazy_static;
use log::{debug, error, info};

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::{
    store::IndexRecord, Addr, Dataspace, Dtype, Error, Ffile, Qref, Result,
};

pub mod bitmap;
pub mod dummy;
pub mod engine;

/// Plug-in id of the full-copy baseline index.
pub const PLUGIN_DUMMY: u32 = 1;

/// Plug-in id of the binned bitmap index.
pub const PLUGIN_BITMAP: u32 = 2;

/// What a plug-in operates on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Class {
    Data,
    Metadata,
}

/// Index creation properties.
#[derive(Clone, Debug)]
pub struct IndexProps {
    read_on_create: bool,
}

impl Default for IndexProps {
    fn default() -> IndexProps {
        IndexProps {
            read_on_create: true,
        }
    }
}

impl IndexProps {
    pub fn new() -> IndexProps {
        IndexProps::default()
    }

    /// Whether `create` eagerly builds the index from current dataset
    /// content, or defers to later update calls. Defaults to true.
    pub fn set_read_on_create(&mut self, read_on_create: bool) -> &mut Self {
        self.read_on_create = read_on_create;
        self
    }

    pub fn is_read_on_create(&self) -> bool {
        self.read_on_create
    }
}

/// Index plug-in factory, registered process-wide.
pub trait Plugin: Send + Sync {
    fn to_id(&self) -> u32;

    fn to_class(&self) -> Class;

    /// Build per-dataset index state, returns the open handle and the
    /// metadata blob to persist.
    fn create(
        &self,
        file: &Ffile,
        dset: Addr,
        props: &IndexProps,
    ) -> Result<(Box<dyn Indexer>, Vec<u8>)>;

    /// Rehydrate the handle from a persisted metadata blob.
    fn open(&self, file: &Ffile, dset: Addr, metadata: &[u8]) -> Result<Box<dyn Indexer>>;

    /// Release the persistent state named by a metadata blob.
    fn remove(&self, file: &Ffile, metadata: &[u8]) -> Result<()>;
}

/// One open index handle.
pub trait Indexer: Send {
    fn pre_update(&mut self, space: &Dataspace) -> Result<()>;

    fn post_update(&mut self, buf: &[u8], space: &Dataspace) -> Result<()>;

    /// Selection of every element below `space`'s extent satisfying
    /// the query.
    fn query(&mut self, space: &Dataspace, q: &Qref) -> Result<Dataspace>;

    /// Emit an updated metadata blob.
    fn refresh(&mut self) -> Result<Vec<u8>>;

    /// Bytes occupied by persistent index state.
    fn get_size(&self) -> Result<u64>;

    fn close(self: Box<Self>) -> Result<()>;
}

fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(dummy::Dummy), Arc::new(bitmap::Binned)]
}

lazy_static! {
    static ref PLUGINS: RwLock<Vec<Arc<dyn Plugin>>> = RwLock::new(builtin_plugins());
}

pub fn register_plugin(plugin: Arc<dyn Plugin>) -> Result<()> {
    let mut plugins = err_at!(Fatal, PLUGINS.write())?;
    if plugins.iter().any(|p| p.to_id() == plugin.to_id()) {
        err_at!(CantCreate, msg: "plugin {} registered", plugin.to_id())?;
    }
    plugins.push(plugin);
    Ok(())
}

pub fn unregister_plugin(id: u32) -> Result<()> {
    let mut plugins = err_at!(Fatal, PLUGINS.write())?;
    match plugins.iter().position(|p| p.to_id() == id) {
        Some(off) => {
            plugins.remove(off);
            Ok(())
        }
        None => err_at!(NotFound, msg: "plugin {}", id),
    }
}

/// Reset the registry to the built-in plug-ins.
pub fn unregister_all() -> Result<()> {
    let mut plugins = err_at!(Fatal, PLUGINS.write())?;
    *plugins = builtin_plugins();
    Ok(())
}

fn lookup_plugin(id: u32) -> Result<Arc<dyn Plugin>> {
    let plugins = err_at!(Fatal, PLUGINS.read())?;
    match plugins.iter().find(|p| p.to_id() == id) {
        Some(plugin) => Ok(Arc::clone(plugin)),
        None => err_at!(NotFound, msg: "plugin {}", id),
    }
}

/// Open index over one dataset.
pub struct Idx {
    file: Ffile,
    dset: Addr,
    plugin: Arc<dyn Plugin>,
    hndl: Box<dyn Indexer>,
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Idx")
            .field("dset", &self.dset)
            .field("plugin_id", &self.plugin.to_id())
            .finish()
    }
}

impl Idx {
    /// Selection of the dataset's elements satisfying the query.
    pub fn query(&mut self, q: &Qref) -> Result<Dataspace> {
        let space = self.file.rd()?.dataset(self.dset)?.space.clone();
        self.hndl.query(&space, q)
    }

    /// Re-persist the plug-in's metadata blob.
    pub fn refresh(&mut self) -> Result<()> {
        let metadata = self.hndl.refresh()?;
        self.file.wr()?.set_index(
            self.dset,
            Some(IndexRecord {
                plugin_id: self.plugin.to_id(),
                metadata,
            }),
        )
    }

    pub fn get_size(&self) -> Result<u64> {
        self.hndl.get_size()
    }

    pub fn close(self) -> Result<()> {
        self.hndl.close()
    }
}

/// Create an index on a dataset. At most one index per dataset, and at
/// most one build in flight.
pub fn create(file: &Ffile, dset: Addr, plugin_id: u32, props: &IndexProps) -> Result<Idx> {
    let plugin = lookup_plugin(plugin_id)?;
    {
        let mut c = file.wr()?;
        if c.index_of(dset)?.is_some() {
            err_at!(CantCreate, msg: "dataset {} already indexed", dset)?;
        }
        if !c.latch_building(dset)? {
            err_at!(CantCreate, msg: "index build in flight on {}", dset)?;
        }
    }

    match plugin.create(file, dset, props) {
        Ok((hndl, metadata)) => {
            let mut c = file.wr()?;
            c.set_index(
                dset,
                Some(IndexRecord {
                    plugin_id,
                    metadata,
                }),
            )?;
            c.unlatch_building(dset)?;
            info!(target: "index", "created plugin {} index on {}", plugin_id, dset);
            Ok(Idx {
                file: file.clone(),
                dset,
                plugin,
                hndl,
            })
        }
        Err(err) => {
            error!(target: "index", "create plugin {} on {}: {}", plugin_id, dset, err);
            file.wr()?.unlatch_building(dset)?;
            Err(err)
        }
    }
}

/// Open the persisted index of a dataset.
pub fn open(file: &Ffile, dset: Addr) -> Result<Idx> {
    let rec = match file.rd()?.index_of(dset)? {
        Some(rec) => rec,
        None => err_at!(CantOpen, msg: "dataset {} has no index", dset)?,
    };
    let plugin = lookup_plugin(rec.plugin_id)?;
    let hndl = plugin.open(file, dset, &rec.metadata)?;
    Ok(Idx {
        file: file.clone(),
        dset,
        plugin,
        hndl,
    })
}

/// Remove a dataset's index, decrementing the refcounts of the
/// anonymous datasets its metadata names and clearing the record.
pub fn remove(file: &Ffile, dset: Addr) -> Result<()> {
    let rec = match file.rd()?.index_of(dset)? {
        Some(rec) => rec,
        None => err_at!(NotFound, msg: "dataset {} has no index", dset)?,
    };
    let plugin = lookup_plugin(rec.plugin_id)?;
    plugin.remove(file, &rec.metadata)?;
    file.wr()?.set_index(dset, None)?;
    info!(target: "index", "removed plugin {} index on {}", rec.plugin_id, dset);
    Ok(())
}

/// Number of indexes on a dataset, zero or one.
pub fn count(file: &Ffile, dset: Addr) -> Result<usize> {
    Ok(match file.rd()?.index_of(dset)? {
        Some(_) => 1,
        None => 0,
    })
}

/// The blessed dataset write path. Scatters `buf` over the selection
/// and brackets the write with the plug-in's update hooks when the
/// dataset is indexed.
pub fn write_dataset(file: &Ffile, dset: Addr, space: &Dataspace, buf: &[u8]) -> Result<()> {
    match file.rd()?.index_of(dset)? {
        Some(_) => {
            let mut idx = open(file, dset)?;
            idx.hndl.pre_update(space)?;
            file.wr()?.write_dataset_sel(dset, space, buf)?;
            idx.hndl.post_update(buf, space)?;
            idx.refresh()?;
            idx.close()
        }
        None => file.wr()?.write_dataset_sel(dset, space, buf),
    }
}

/// Selection of the dataset's elements satisfying the query, through
/// the index when one is persisted, by brute-force scan otherwise.
pub fn query_dataset(file: &Ffile, dset: Addr, q: &Qref) -> Result<Dataspace> {
    match file.rd()?.index_of(dset)? {
        Some(_) => {
            let mut idx = open(file, dset)?;
            let out = idx.query(q);
            idx.close()?;
            out
        }
        None => {
            debug!(target: "index", "brute-force scan of {}", dset);
            let (dtype, space, data) = {
                let c = file.rd()?;
                let d = c.dataset(dset)?;
                (d.dtype, d.space.clone(), c.read_dataset(dset)?)
            };
            scan_select(&space, dtype, &data, q)
        }
    }
}

/// Scan `data` element-wise and select every match into a copy of
/// `space`.
pub fn scan_select(
    space: &Dataspace,
    dtype: Dtype,
    data: &[u8],
    q: &Qref,
) -> Result<Dataspace> {
    let esz = dtype.size();
    let mut out = space.clone();
    out.select_none();
    let ones = vec![1; space.rank()];
    for i in 0..space.extent_npoints() {
        let off = i as usize * esz;
        let elem = &data[off..off + esz];
        if q.apply_elem(dtype, elem)? {
            let coords = out.linear_to_coords(i);
            out.select_or(&coords, &ones)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
