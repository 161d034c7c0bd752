//! Module `store` implement the container collaborator, a hierarchical
//! store of groups, datasets and attributes addressed by `u64` object
//! addresses, with a global heap, anonymous objects kept alive through
//! explicit refcounts, and a process-wide location registry for open
//! file handles.
//!
//! The container here is an in-memory realization of the interface the
//! query, reference and index subsystems consume. Snapshots serialize
//! to CBOR so a container can be persisted and reopened.

use cbordata::Cborize;
use lazy_static::lazy_static;

use std::{
    collections::{BTreeMap, HashMap},
    convert::TryFrom,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{space::Selection, util, Dataspace, Dtype, Error, Result};

pub mod heap;

pub use heap::Heap;

/// Object address within a container.
pub type Addr = u64;

const SHOT_VER: u32 = 0x00170001;

/// Per-dataset index record, the persisted half of the index plug-in
/// state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexRecord {
    pub plugin_id: u32,
    pub metadata: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Attr {
    pub dtype: Dtype,
    pub space: Dataspace,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct Group {
    links: BTreeMap<String, Addr>,
    attrs: BTreeMap<String, Attr>,
}

#[derive(Clone, Debug)]
pub struct Dataset {
    pub dtype: Dtype,
    pub space: Dataspace,
    data: Vec<u8>,
    attrs: BTreeMap<String, Attr>,
    index: Option<IndexRecord>,
    building: bool, // volatile build latch, not persisted
}

#[derive(Clone, Debug)]
enum Okind {
    Group(Group),
    Dataset(Dataset),
}

#[derive(Clone, Debug)]
struct Object {
    kind: Okind,
    refn: u32,
}

/// In-memory container. Obtain shared open handles via [Ffile].
#[derive(Clone, Debug)]
pub struct Container {
    name: String,
    addr_size: usize,
    len_size: usize,
    next_addr: Addr,
    root: Addr,
    objs: BTreeMap<Addr, Object>,
    heap: Heap,
}

impl Container {
    pub fn new(name: &str) -> Container {
        let root = 1;
        let mut objs = BTreeMap::new();
        objs.insert(
            root,
            Object {
                kind: Okind::Group(Group::default()),
                refn: 1,
            },
        );
        Container {
            name: name.to_string(),
            addr_size: 8,
            len_size: 8,
            next_addr: root + 1,
            root,
            objs,
            heap: Heap::new(),
        }
    }

    pub fn set_addr_size(&mut self, addr_size: usize) -> Result<&mut Self> {
        match addr_size {
            2 | 4 | 8 => {
                self.addr_size = addr_size;
                Ok(self)
            }
            n => err_at!(InvalidInput, msg: "address size {}", n),
        }
    }

    pub fn set_len_size(&mut self, len_size: usize) -> Result<&mut Self> {
        match len_size {
            2 | 4 | 8 => {
                self.len_size = len_size;
                Ok(self)
            }
            n => err_at!(InvalidInput, msg: "length size {}", n),
        }
    }

    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    pub fn addr_size(&self) -> usize {
        self.addr_size
    }

    pub fn len_size(&self) -> usize {
        self.len_size
    }

    pub fn root(&self) -> Addr {
        self.root
    }

    /// Byte size of one element of `dtype` as stored in this container.
    /// Reference elements depend on the address-size setting.
    pub fn elem_size(&self, dtype: Dtype) -> usize {
        match dtype {
            Dtype::Ref => 4 + self.addr_size + 4,
            dtype => dtype.size(),
        }
    }

    fn alloc_addr(&mut self) -> Addr {
        let addr = self.next_addr;
        self.next_addr += 1;
        addr
    }

    fn object(&self, addr: Addr) -> Result<&Object> {
        match self.objs.get(&addr) {
            Some(obj) => Ok(obj),
            None => err_at!(NotFound, msg: "object {}", addr),
        }
    }

    fn object_mut(&mut self, addr: Addr) -> Result<&mut Object> {
        match self.objs.get_mut(&addr) {
            Some(obj) => Ok(obj),
            None => err_at!(NotFound, msg: "object {}", addr),
        }
    }

    fn group(&self, addr: Addr) -> Result<&Group> {
        match &self.object(addr)?.kind {
            Okind::Group(grp) => Ok(grp),
            Okind::Dataset(_) => err_at!(BadType, msg: "object {} not a group", addr),
        }
    }

    fn group_mut(&mut self, addr: Addr) -> Result<&mut Group> {
        match &mut self.object_mut(addr)?.kind {
            Okind::Group(grp) => Ok(grp),
            Okind::Dataset(_) => err_at!(BadType, msg: "object {} not a group", addr),
        }
    }

    pub fn dataset(&self, addr: Addr) -> Result<&Dataset> {
        match &self.object(addr)?.kind {
            Okind::Dataset(dset) => Ok(dset),
            Okind::Group(_) => err_at!(BadType, msg: "object {} not a dataset", addr),
        }
    }

    fn dataset_mut(&mut self, addr: Addr) -> Result<&mut Dataset> {
        match &mut self.object_mut(addr)?.kind {
            Okind::Dataset(dset) => Ok(dset),
            Okind::Group(_) => err_at!(BadType, msg: "object {} not a dataset", addr),
        }
    }

    pub fn is_group(&self, addr: Addr) -> Result<bool> {
        match self.object(addr)?.kind {
            Okind::Group(_) => Ok(true),
            Okind::Dataset(_) => Ok(false),
        }
    }

    pub fn create_group(&mut self, parent: Addr, name: &str) -> Result<Addr> {
        if name.is_empty() || name.contains('/') {
            err_at!(InvalidInput, msg: "link name {:?}", name)?;
        }
        let addr = self.alloc_addr();
        {
            let grp = self.group_mut(parent)?;
            if grp.links.contains_key(name) {
                err_at!(CantCreate, msg: "link {:?} exists", name)?;
            }
            grp.links.insert(name.to_string(), addr);
        }
        self.objs.insert(
            addr,
            Object {
                kind: Okind::Group(Group::default()),
                refn: 1,
            },
        );
        Ok(addr)
    }

    /// Create a group with no link pointing at it, the caller owns the
    /// single refcount.
    pub fn create_group_anon(&mut self) -> Addr {
        let addr = self.alloc_addr();
        self.objs.insert(
            addr,
            Object {
                kind: Okind::Group(Group::default()),
                refn: 1,
            },
        );
        addr
    }

    fn make_dataset(&self, dtype: Dtype, space: Dataspace) -> Dataset {
        let n = space.extent_npoints() as usize * self.elem_size(dtype);
        Dataset {
            dtype,
            space,
            data: vec![0; n],
            attrs: BTreeMap::new(),
            index: None,
            building: false,
        }
    }

    pub fn create_dataset(
        &mut self,
        parent: Addr,
        name: &str,
        dtype: Dtype,
        space: Dataspace,
    ) -> Result<Addr> {
        if name.is_empty() || name.contains('/') {
            err_at!(InvalidInput, msg: "link name {:?}", name)?;
        }
        let dset = self.make_dataset(dtype, space);
        let addr = self.alloc_addr();
        {
            let grp = self.group_mut(parent)?;
            if grp.links.contains_key(name) {
                err_at!(CantCreate, msg: "link {:?} exists", name)?;
            }
            grp.links.insert(name.to_string(), addr);
        }
        self.objs.insert(
            addr,
            Object {
                kind: Okind::Dataset(dset),
                refn: 1,
            },
        );
        Ok(addr)
    }

    /// Create an anonymous dataset. It starts with a zero refcount,
    /// increment it to keep the dataset alive past the creating scope.
    pub fn create_dataset_anon(&mut self, dtype: Dtype, space: Dataspace) -> Result<Addr> {
        let dset = self.make_dataset(dtype, space);
        let addr = self.alloc_addr();
        self.objs.insert(
            addr,
            Object {
                kind: Okind::Dataset(dset),
                refn: 0,
            },
        );
        Ok(addr)
    }

    pub fn incr_refn(&mut self, addr: Addr) -> Result<u32> {
        let obj = self.object_mut(addr)?;
        obj.refn += 1;
        Ok(obj.refn)
    }

    /// Decrement an object's refcount, the object is reclaimed when the
    /// count reaches zero.
    pub fn decr_refn(&mut self, addr: Addr) -> Result<u32> {
        let obj = self.object_mut(addr)?;
        if obj.refn == 0 {
            err_at!(CantClose, msg: "object {} refcount is zero", addr)?;
        }
        obj.refn -= 1;
        let refn = obj.refn;
        if refn == 0 {
            self.objs.remove(&addr);
        }
        Ok(refn)
    }

    pub fn refn(&self, addr: Addr) -> Result<u32> {
        Ok(self.object(addr)?.refn)
    }

    pub fn exists(&self, addr: Addr) -> bool {
        self.objs.contains_key(&addr)
    }

    /// Resolve a path under `loc`. A leading '/' resolves from the
    /// container root.
    pub fn resolve(&self, loc: Addr, path: &str) -> Result<Addr> {
        let mut addr = if path.starts_with('/') { self.root } else { loc };
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let grp = self.group(addr)?;
            addr = match grp.links.get(part) {
                Some(addr) => *addr,
                None => err_at!(NotFound, msg: "no link {:?} under {}", part, addr)?,
            };
        }
        Ok(addr)
    }

    /// Absolute path of a reachable object, anonymous objects fail
    /// `NotFound`.
    pub fn path_of(&self, addr: Addr) -> Result<String> {
        if addr == self.root {
            return Ok("/".to_string());
        }
        let mut stack = vec![(self.root, String::new())];
        while let Some((at, path)) = stack.pop() {
            if let Okind::Group(grp) = &self.object(at)?.kind {
                for (name, child) in grp.links.iter() {
                    let cpath = format!("{}/{}", path, name);
                    if *child == addr {
                        return Ok(cpath);
                    }
                    stack.push((*child, cpath));
                }
            }
        }
        err_at!(NotFound, msg: "no path to object {}", addr)
    }

    /// All objects below `loc` as `(relative-path, address)`, visited
    /// depth-first with siblings in lexicographic name order. The
    /// starting object itself is not listed.
    pub fn visit(&self, loc: Addr) -> Result<Vec<(String, Addr)>> {
        let mut out = vec![];
        self.visit_under(loc, "", &mut out)?;
        Ok(out)
    }

    fn visit_under(
        &self,
        at: Addr,
        prefix: &str,
        out: &mut Vec<(String, Addr)>,
    ) -> Result<()> {
        if let Okind::Group(grp) = &self.object(at)?.kind {
            for (name, child) in grp.links.iter() {
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                out.push((path.clone(), *child));
                self.visit_under(*child, &path, out)?;
            }
        }
        Ok(())
    }

    pub fn read_dataset(&self, addr: Addr) -> Result<Vec<u8>> {
        Ok(self.dataset(addr)?.data.clone())
    }

    /// Gather the selected elements of a dataset, `space` must carry
    /// the dataset's extent.
    pub fn read_dataset_sel(&self, addr: Addr, space: &Dataspace) -> Result<Vec<u8>> {
        let dset = self.dataset(addr)?;
        if space.dims() != dset.space.dims() {
            err_at!(InvalidInput, msg: "extent mismatch {:?}", space.dims())?;
        }
        let esz = self.elem_size(dset.dtype);
        let mut out = Vec::with_capacity(space.npoints() as usize * esz);
        for point in space.linear_points() {
            let off = point as usize * esz;
            out.extend_from_slice(&dset.data[off..off + esz]);
        }
        Ok(out)
    }

    /// Overwrite the whole dataset.
    pub fn write_dataset(&mut self, addr: Addr, buf: &[u8]) -> Result<()> {
        let esz = {
            let dset = self.dataset(addr)?;
            self.elem_size(dset.dtype)
        };
        let dset = self.dataset_mut(addr)?;
        let want = dset.space.extent_npoints() as usize * esz;
        if buf.len() != want {
            err_at!(InvalidInput, msg: "write {}b, dataset is {}b", buf.len(), want)?;
        }
        dset.data.clear();
        dset.data.extend_from_slice(buf);
        Ok(())
    }

    /// Scatter `buf` over the selected elements, in dataspace order.
    pub fn write_dataset_sel(
        &mut self,
        addr: Addr,
        space: &Dataspace,
        buf: &[u8],
    ) -> Result<()> {
        if let Selection::All = space.selection() {
            return self.write_dataset(addr, buf);
        }
        let esz = {
            let dset = self.dataset(addr)?;
            if space.dims() != dset.space.dims() {
                err_at!(InvalidInput, msg: "extent mismatch {:?}", space.dims())?;
            }
            self.elem_size(dset.dtype)
        };
        let points = space.linear_points();
        if buf.len() != points.len() * esz {
            err_at!(
                InvalidInput, msg: "write {}b over {} points", buf.len(), points.len()
            )?;
        }
        let dset = self.dataset_mut(addr)?;
        for (i, point) in points.into_iter().enumerate() {
            let off = point as usize * esz;
            dset.data[off..off + esz].copy_from_slice(&buf[i * esz..(i + 1) * esz]);
        }
        Ok(())
    }

    /// Bytes occupied by the dataset's raw storage.
    pub fn storage_size(&self, addr: Addr) -> Result<u64> {
        Ok(self.dataset(addr)?.data.len() as u64)
    }

    fn attrs_of(&self, addr: Addr) -> Result<&BTreeMap<String, Attr>> {
        match &self.object(addr)?.kind {
            Okind::Group(grp) => Ok(&grp.attrs),
            Okind::Dataset(dset) => Ok(&dset.attrs),
        }
    }

    fn attrs_of_mut(&mut self, addr: Addr) -> Result<&mut BTreeMap<String, Attr>> {
        match &mut self.object_mut(addr)?.kind {
            Okind::Group(grp) => Ok(&mut grp.attrs),
            Okind::Dataset(dset) => Ok(&mut dset.attrs),
        }
    }

    pub fn create_attr(
        &mut self,
        addr: Addr,
        name: &str,
        dtype: Dtype,
        space: Dataspace,
        data: Vec<u8>,
    ) -> Result<()> {
        if name.is_empty() {
            err_at!(InvalidInput, msg: "empty attribute name")?;
        }
        let want = space.extent_npoints() as usize * self.elem_size(dtype);
        if data.len() != want {
            err_at!(InvalidInput, msg: "attr data {}b, want {}b", data.len(), want)?;
        }
        let attrs = self.attrs_of_mut(addr)?;
        if attrs.contains_key(name) {
            err_at!(CantCreate, msg: "attribute {:?} exists", name)?;
        }
        attrs.insert(name.to_string(), Attr { dtype, space, data });
        Ok(())
    }

    pub fn read_attr(&self, addr: Addr, name: &str) -> Result<&Attr> {
        match self.attrs_of(addr)?.get(name) {
            Some(attr) => Ok(attr),
            None => err_at!(NotFound, msg: "attribute {:?} on {}", name, addr),
        }
    }

    pub fn write_attr(&mut self, addr: Addr, name: &str, data: Vec<u8>) -> Result<()> {
        match self.attrs_of_mut(addr)?.get_mut(name) {
            Some(attr) if attr.data.len() == data.len() => {
                attr.data = data;
                Ok(())
            }
            Some(attr) => {
                err_at!(InvalidInput, msg: "attr {}b, write {}b", attr.data.len(), data.len())
            }
            None => err_at!(NotFound, msg: "attribute {:?} on {}", name, addr),
        }
    }

    /// Attribute names on an object, lexicographic.
    pub fn attr_names(&self, addr: Addr) -> Result<Vec<String>> {
        Ok(self.attrs_of(addr)?.keys().cloned().collect())
    }

    pub fn index_of(&self, addr: Addr) -> Result<Option<IndexRecord>> {
        Ok(self.dataset(addr)?.index.clone())
    }

    pub fn set_index(&mut self, addr: Addr, index: Option<IndexRecord>) -> Result<()> {
        self.dataset_mut(addr)?.index = index;
        Ok(())
    }

    /// Latch the dataset for index construction. Returns false when a
    /// build is already in flight.
    pub fn latch_building(&mut self, addr: Addr) -> Result<bool> {
        let dset = self.dataset_mut(addr)?;
        match dset.building {
            true => Ok(false),
            false => {
                dset.building = true;
                Ok(true)
            }
        }
    }

    pub fn unlatch_building(&mut self, addr: Addr) -> Result<()> {
        self.dataset_mut(addr)?.building = false;
        Ok(())
    }

    pub fn heap_insert(&mut self, data: Vec<u8>) -> (u64, u32) {
        self.heap.insert(data)
    }

    pub fn heap_read(&self, addr: u64, idx: u32) -> Result<Vec<u8>> {
        Ok(self.heap.read(addr, idx)?.to_vec())
    }

    pub fn heap_remove(&mut self, addr: u64, idx: u32) -> Result<Vec<u8>> {
        self.heap.remove(addr, idx)
    }

    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }
}

// Snapshot persistence. The CBOR records mirror the container tree
// with wire-encoded dataspace and datatype blobs.

#[derive(Clone, Cborize)]
struct FileShot {
    name: String,
    addr_size: u64,
    len_size: u64,
    next_addr: u64,
    root: u64,
    objs: Vec<ObjShot>,
    heap_cur_addr: u64,
    heap_cur_idx: u64,
    heap_objs: Vec<HeapShot>,
}

impl FileShot {
    const ID: u32 = SHOT_VER;
}

#[derive(Clone, Cborize)]
struct ObjShot {
    addr: u64,
    is_group: bool,
    refn: u64,
    links: Vec<LinkShot>,
    attrs: Vec<AttrShot>,
    dtype: Vec<u8>,
    space: Vec<u8>,
    data: Vec<u8>,
    has_index: bool,
    index_plugin: u64,
    index_meta: Vec<u8>,
}

impl ObjShot {
    const ID: u32 = SHOT_VER;
}

#[derive(Clone, Cborize)]
struct LinkShot {
    name: String,
    addr: u64,
}

impl LinkShot {
    const ID: u32 = SHOT_VER;
}

#[derive(Clone, Cborize)]
struct AttrShot {
    name: String,
    dtype: Vec<u8>,
    space: Vec<u8>,
    data: Vec<u8>,
}

impl AttrShot {
    const ID: u32 = SHOT_VER;
}

#[derive(Clone, Cborize)]
struct HeapShot {
    addr: u64,
    idx: u64,
    data: Vec<u8>,
}

impl HeapShot {
    const ID: u32 = SHOT_VER;
}

fn encode_space(space: &Dataspace) -> Result<Vec<u8>> {
    let n = space.encode(&mut [])?;
    let mut buf = vec![0; n];
    space.encode(&mut buf)?;
    Ok(buf)
}

fn encode_dtype(dtype: Dtype) -> Vec<u8> {
    let mut buf = vec![0; 2];
    dtype.encode(&mut buf);
    buf
}

fn attr_to_shot(name: &str, attr: &Attr) -> Result<AttrShot> {
    Ok(AttrShot {
        name: name.to_string(),
        dtype: encode_dtype(attr.dtype),
        space: encode_space(&attr.space)?,
        data: attr.data.clone(),
    })
}

fn shot_to_attr(shot: AttrShot) -> Result<(String, Attr)> {
    let (dtype, _) = Dtype::decode(&shot.dtype)?;
    let (space, _) = Dataspace::decode(&shot.space)?;
    Ok((
        shot.name,
        Attr {
            dtype,
            space,
            data: shot.data,
        },
    ))
}

impl Container {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut objs = vec![];
        for (addr, obj) in self.objs.iter() {
            let shot = match &obj.kind {
                Okind::Group(grp) => {
                    let links = grp
                        .links
                        .iter()
                        .map(|(name, addr)| LinkShot {
                            name: name.clone(),
                            addr: *addr,
                        })
                        .collect();
                    let mut attrs = vec![];
                    for (name, attr) in grp.attrs.iter() {
                        attrs.push(attr_to_shot(name, attr)?);
                    }
                    ObjShot {
                        addr: *addr,
                        is_group: true,
                        refn: obj.refn as u64,
                        links,
                        attrs,
                        dtype: vec![],
                        space: vec![],
                        data: vec![],
                        has_index: false,
                        index_plugin: 0,
                        index_meta: vec![],
                    }
                }
                Okind::Dataset(dset) => {
                    let mut attrs = vec![];
                    for (name, attr) in dset.attrs.iter() {
                        attrs.push(attr_to_shot(name, attr)?);
                    }
                    let (has_index, index_plugin, index_meta) = match &dset.index {
                        Some(rec) => (true, rec.plugin_id as u64, rec.metadata.clone()),
                        None => (false, 0, vec![]),
                    };
                    ObjShot {
                        addr: *addr,
                        is_group: false,
                        refn: obj.refn as u64,
                        links: vec![],
                        attrs,
                        dtype: encode_dtype(dset.dtype),
                        space: encode_space(&dset.space)?,
                        data: dset.data.clone(),
                        has_index,
                        index_plugin,
                        index_meta,
                    }
                }
            };
            objs.push(shot);
        }

        let (heap_cur_addr, heap_cur_idx) = self.heap.cursor();
        let heap_objs = self
            .heap
            .to_entries()
            .into_iter()
            .map(|(addr, idx, data)| HeapShot {
                addr,
                idx: idx as u64,
                data,
            })
            .collect();

        let shot = FileShot {
            name: self.name.clone(),
            addr_size: self.addr_size as u64,
            len_size: self.len_size as u64,
            next_addr: self.next_addr,
            root: self.root,
            objs,
            heap_cur_addr,
            heap_cur_idx: heap_cur_idx as u64,
            heap_objs,
        };
        util::into_cbor_bytes(shot)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Container> {
        let (shot, _): (FileShot, usize) = util::from_cbor_bytes(data)?;

        let mut objs = BTreeMap::new();
        for oshot in shot.objs.into_iter() {
            let refn = err_at!(FailConvert, u32::try_from(oshot.refn))?;
            let kind = if oshot.is_group {
                let mut grp = Group::default();
                for link in oshot.links.into_iter() {
                    grp.links.insert(link.name, link.addr);
                }
                for ashot in oshot.attrs.into_iter() {
                    let (name, attr) = shot_to_attr(ashot)?;
                    grp.attrs.insert(name, attr);
                }
                Okind::Group(grp)
            } else {
                let (dtype, _) = Dtype::decode(&oshot.dtype)?;
                let (space, _) = Dataspace::decode(&oshot.space)?;
                let mut attrs = BTreeMap::new();
                for ashot in oshot.attrs.into_iter() {
                    let (name, attr) = shot_to_attr(ashot)?;
                    attrs.insert(name, attr);
                }
                let index = match oshot.has_index {
                    true => Some(IndexRecord {
                        plugin_id: err_at!(FailConvert, u32::try_from(oshot.index_plugin))?,
                        metadata: oshot.index_meta,
                    }),
                    false => None,
                };
                Okind::Dataset(Dataset {
                    dtype,
                    space,
                    data: oshot.data,
                    attrs,
                    index,
                    building: false,
                })
            };
            objs.insert(oshot.addr, Object { kind, refn });
        }

        let mut heap_objs = Vec::with_capacity(shot.heap_objs.len());
        for h in shot.heap_objs.into_iter() {
            let idx = err_at!(FailConvert, u32::try_from(h.idx))?;
            heap_objs.push((h.addr, idx, h.data));
        }
        let heap = Heap::from_entries(
            shot.heap_cur_addr,
            err_at!(FailConvert, u32::try_from(shot.heap_cur_idx))?,
            heap_objs,
        );

        if !objs.contains_key(&shot.root) {
            err_at!(InvalidFile, msg: "snapshot has no root object {}", shot.root)?;
        }

        let mut container = Container::new(&shot.name);
        container.addr_size = shot.addr_size as usize;
        container.len_size = shot.len_size as usize;
        container.next_addr = shot.next_addr;
        container.root = shot.root;
        container.objs = objs;
        container.heap = heap;
        Ok(container)
    }
}

/// Shared open handle over a [Container].
#[derive(Clone)]
pub struct Ffile {
    inner: Arc<RwLock<Container>>,
}

impl Ffile {
    pub fn create(name: &str) -> Ffile {
        Ffile {
            inner: Arc::new(RwLock::new(Container::new(name))),
        }
    }

    pub fn from_container(container: Container) -> Ffile {
        Ffile {
            inner: Arc::new(RwLock::new(container)),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Ffile> {
        Ok(Ffile::from_container(Container::from_bytes(data)?))
    }

    pub fn rd(&self) -> Result<RwLockReadGuard<Container>> {
        err_at!(Fatal, self.inner.read())
    }

    pub fn wr(&self) -> Result<RwLockWriteGuard<Container>> {
        err_at!(Fatal, self.inner.write())
    }

    pub fn to_name(&self) -> Result<String> {
        Ok(self.rd()?.to_name())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.rd()?.to_bytes()
    }

    fn ptr_eq(&self, other: &Ffile) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// Process-wide location registry. References hold one strong count on
// the location they were materialized from.

#[derive(Default)]
struct Locations {
    next: u64,
    entries: HashMap<u64, LocEntry>,
}

struct LocEntry {
    file: Ffile,
    count: u64,
}

lazy_static! {
    static ref LOCATIONS: Mutex<Locations> = Mutex::new(Locations::default());
}

/// Register an open file handle, returns a fresh location id holding
/// one count.
pub fn register_loc(file: &Ffile) -> Result<u64> {
    let mut locs = err_at!(Fatal, LOCATIONS.lock())?;
    locs.next += 1;
    let id = locs.next;
    locs.entries.insert(
        id,
        LocEntry {
            file: file.clone(),
            count: 1,
        },
    );
    Ok(id)
}

/// Location id for an open file handle. An already registered handle
/// resolves to its id without touching the count, a fresh handle is
/// registered with the registry-owned base count.
pub fn ensure_loc(file: &Ffile) -> Result<u64> {
    let mut locs = err_at!(Fatal, LOCATIONS.lock())?;
    let found = locs
        .entries
        .iter()
        .find(|(_, entry)| entry.file.ptr_eq(file))
        .map(|(id, _)| *id);
    match found {
        Some(id) => Ok(id),
        None => {
            locs.next += 1;
            let id = locs.next;
            locs.entries.insert(
                id,
                LocEntry {
                    file: file.clone(),
                    count: 1,
                },
            );
            Ok(id)
        }
    }
}

pub fn incr_loc(id: u64) -> Result<()> {
    let mut locs = err_at!(Fatal, LOCATIONS.lock())?;
    match locs.entries.get_mut(&id) {
        Some(entry) => {
            entry.count += 1;
            Ok(())
        }
        None => err_at!(NotFound, msg: "location {}", id),
    }
}

pub fn decr_loc(id: u64) -> Result<()> {
    let mut locs = err_at!(Fatal, LOCATIONS.lock())?;
    match locs.entries.get_mut(&id) {
        Some(entry) => {
            entry.count -= 1;
            if entry.count == 0 {
                locs.entries.remove(&id);
            }
            Ok(())
        }
        None => err_at!(NotFound, msg: "location {}", id),
    }
}

pub fn loc_file(id: u64) -> Result<Ffile> {
    let locs = err_at!(Fatal, LOCATIONS.lock())?;
    match locs.entries.get(&id) {
        Some(entry) => Ok(entry.file.clone()),
        None => err_at!(NotFound, msg: "location {}", id),
    }
}

pub fn loc_count(id: u64) -> Result<u64> {
    let locs = err_at!(Fatal, LOCATIONS.lock())?;
    match locs.entries.get(&id) {
        Some(entry) => Ok(entry.count),
        None => Ok(0),
    }
}

/// Drop every registered location, regardless of outstanding counts.
pub fn drop_locations() -> Result<()> {
    let mut locs = err_at!(Fatal, LOCATIONS.lock())?;
    locs.entries.clear();
    Ok(())
}
