//! Module `apply` implement query application over container content.
//!
//! Applying a query below a location visits every object in
//! lexicographic name order, dispatches data-element predicates to the
//! per-dataset index, and packages the outcome as reference datasets
//! inside an anonymous result group: `Reg_refs` for region references,
//! `Obj_refs` for object references, `Attr_refs` for attribute
//! references. Only the categories that fired are created, the caller
//! learns which through the result bitmask.

use log::{debug, info};

use std::convert::TryFrom;

use crate::{
    index,
    query::{extract, leaf_kinds, Qref, Qtype},
    reference::bridge::{Disk, Mem, Placement},
    store::Attr,
    transport::Comm,
    Addr, Dataspace, Dtype, Error, Ffile, Ref, Result,
};

/// Region references are present in the view.
pub const REF_REG: u32 = 0x100;

/// Object references are present in the view.
pub const REF_OBJ: u32 = 0x010;

/// Attribute references are present in the view.
pub const REF_ATTR: u32 = 0x001;

/// Link names of the view's reference datasets.
pub const VIEW_REF_REG_NAME: &str = "Reg_refs";
pub const VIEW_REF_OBJ_NAME: &str = "Obj_refs";
pub const VIEW_REF_ATTR_NAME: &str = "Attr_refs";

/// View creation properties, restricting which reference categories an
/// apply may emit. Defaults to all of them.
#[derive(Clone, Debug)]
pub struct ViewProps {
    allow: u32,
}

impl Default for ViewProps {
    fn default() -> ViewProps {
        ViewProps {
            allow: REF_REG | REF_OBJ | REF_ATTR,
        }
    }
}

impl ViewProps {
    pub fn new() -> ViewProps {
        ViewProps::default()
    }

    pub fn set_allow(&mut self, mask: u32) -> &mut Self {
        self.allow = mask;
        self
    }
}

/// Result of an apply: the anonymous result group and the bitmask of
/// populated reference categories.
#[derive(Debug)]
pub struct View {
    pub group: Addr,
    pub mask: u32,
}

impl View {
    pub fn regions(&self, file: &Ffile) -> Result<Vec<Ref>> {
        self.read_refs(file, VIEW_REF_REG_NAME)
    }

    pub fn objects(&self, file: &Ffile) -> Result<Vec<Ref>> {
        self.read_refs(file, VIEW_REF_OBJ_NAME)
    }

    pub fn attributes(&self, file: &Ffile) -> Result<Vec<Ref>> {
        self.read_refs(file, VIEW_REF_ATTR_NAME)
    }

    fn read_refs(&self, file: &Ffile, name: &str) -> Result<Vec<Ref>> {
        let dset = match file.rd()?.resolve(self.group, name) {
            Ok(dset) => dset,
            Err(Error::NotFound(_, _)) => return Ok(vec![]),
            Err(err) => return Err(err),
        };
        let (esz, data) = {
            let c = file.rd()?;
            (c.elem_size(Dtype::Ref), c.read_dataset(dset)?)
        };
        let disk = Disk::new(file.clone());
        let mem = Mem;
        let mut refs = vec![];
        for elem in data.chunks(esz) {
            let buf = disk.read(&elem.to_vec())?;
            refs.push(mem.write(&buf, None)?);
        }
        Ok(refs)
    }

    /// Discard the view, releasing the result group.
    pub fn close(self, file: &Ffile) -> Result<()> {
        discard_group(file, self.group)
    }
}

fn discard_group(file: &Ffile, group: Addr) -> Result<()> {
    let names = {
        let c = file.rd()?;
        c.visit(group)?
    };
    let mut c = file.wr()?;
    for (_, addr) in names.into_iter() {
        c.decr_refn(addr).ok();
    }
    c.decr_refn(group)?;
    Ok(())
}

// One reference category collected during an apply.
struct Bucket {
    name: &'static str,
    bit: u32,
    refs: Vec<Ref>,
}

impl Bucket {
    fn new(name: &'static str, bit: u32) -> Bucket {
        Bucket {
            name,
            bit,
            refs: vec![],
        }
    }
}

fn attr_matches(attr_q: &Qref, attrs: &[(String, Attr)]) -> Result<Option<String>> {
    for (name, attr) in attrs.iter() {
        if attr_q.apply_attr(name, attr.dtype, &attr.data)? {
            return Ok(Some(name.clone()));
        }
    }
    Ok(None)
}

/// Apply a query to everything below `loc`, producing a [View] in the
/// same container. On any failure the partially built result group is
/// discarded and the call fails as a unit.
pub fn apply(file: &Ffile, loc: Addr, q: &Qref, props: &ViewProps) -> Result<View> {
    let kinds = leaf_kinds(q);
    let data_q = extract(q, &[Qtype::DataElem]);
    let link_q = extract(q, &[Qtype::LinkName]);
    let attr_q = extract(q, &[Qtype::AttrValue, Qtype::AttrName]);
    debug!(
        target: "apply",
        "apply below {} with leaves {:?}", loc, kinds
    );

    let mut reg = Bucket::new(VIEW_REF_REG_NAME, REF_REG);
    let mut obj = Bucket::new(VIEW_REF_OBJ_NAME, REF_OBJ);
    let mut att = Bucket::new(VIEW_REF_ATTR_NAME, REF_ATTR);

    let visited = file.rd()?.visit(loc)?;
    for (path, addr) in visited.into_iter() {
        let obj_name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let (dtype, attrs) = {
            let c = file.rd()?;
            let dtype = match c.is_group(addr)? {
                true => None,
                false => Some(c.dataset(addr)?.dtype),
            };
            let mut attrs = vec![];
            for name in c.attr_names(addr)? {
                attrs.push((name.clone(), c.read_attr(addr, &name)?.clone()));
            }
            (dtype, attrs)
        };

        // link-name predicates gate by the object's own name
        if let Some(link_q) = &link_q {
            if !link_q.apply_name(Some(&obj_name))? {
                continue;
            }
        }
        // attribute predicates gate by any matching attribute
        let attr_hit = match &attr_q {
            Some(attr_q) => attr_matches(attr_q, &attrs)?,
            None => None,
        };
        if attr_q.is_some() && attr_hit.is_none() {
            continue;
        }

        match &data_q {
            Some(data_q) => {
                // data-element leaves make this a region query, over
                // scalar datasets only
                match dtype {
                    Some(Dtype::Ref) | None => continue,
                    Some(_) => (),
                }
                if props.allow & REF_REG == 0 {
                    continue;
                }
                let selected = index::query_dataset(file, addr, data_q)?;
                if selected.is_selected() && selected.npoints() > 0 {
                    reg.refs
                        .push(Ref::create_region(file, loc, &path, &selected)?);
                }
            }
            None if link_q.is_some() => {
                if props.allow & REF_OBJ != 0 {
                    obj.refs.push(Ref::create_object(file, loc, &path)?);
                }
            }
            None => {
                if let (Some(attr_name), true) = (&attr_hit, props.allow & REF_ATTR != 0) {
                    att.refs
                        .push(Ref::create_attr(file, loc, &path, attr_name)?);
                }
            }
        }
    }

    package_view(file, vec![reg, obj, att])
}

/// Package collected references as datasets inside a fresh anonymous
/// group.
fn package_view(file: &Ffile, buckets: Vec<Bucket>) -> Result<View> {
    let group = file.wr()?.create_group_anon();
    let mut mask = 0;

    for bucket in buckets.iter() {
        if bucket.refs.is_empty() {
            continue;
        }
        if let Err(err) = store_refs(file, group, bucket) {
            discard_group(file, group).ok();
            return Err(err);
        }
        mask |= bucket.bit;
    }
    info!(target: "apply", "view group {} mask {:03x}", group, mask);
    Ok(View { group, mask })
}

fn store_refs(file: &Ffile, group: Addr, bucket: &Bucket) -> Result<()> {
    let mem = Mem;
    let disk = Disk::new(file.clone());

    let mut data = vec![];
    for r in bucket.refs.iter() {
        let buf = mem.read(r)?;
        data.extend_from_slice(&disk.write(&buf, None)?);
    }

    let n = err_at!(FailConvert, u64::try_from(bucket.refs.len()))?;
    let space = Dataspace::new(vec![n])?;
    let mut c = file.wr()?;
    let dset = c.create_dataset(group, bucket.name, Dtype::Ref, space)?;
    c.write_dataset(dset, &data)
}

/// Collective entry point: apply one query across many containers,
/// each rank opens and applies to its share of the files. Returns
/// `(file-index, view)` pairs for this rank's share.
pub fn apply_multi(
    files: &[Ffile],
    q: &Qref,
    props: &ViewProps,
    comm: &dyn Comm,
) -> Result<Vec<(usize, View)>> {
    let (rank, size) = (comm.rank(), comm.size());
    info!(
        target: "apply",
        "rank {}/{} applying across {} files", rank, size, files.len()
    );
    let mut views = vec![];
    for (i, file) in files.iter().enumerate() {
        if i % size != rank {
            continue;
        }
        let root = file.rd()?.root();
        views.push((i, apply(file, root, q, props)?));
    }
    Ok(views)
}

#[cfg(test)]
#[path = "apply_test.rs"]
mod apply_test;
