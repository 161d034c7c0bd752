//! Module `query` implement predicate trees over container content.
//!
//! Leaves select data elements, attribute values, attribute names or
//! link names; `combine` builds AND/OR trees over them. Trees share
//! nodes by strong reference count, the user facing handle is
//! [Qref], an `Arc<Query>`, a combined node holds one count on each of
//! its children and closing a handle is dropping it.
//!
//! Trees serialize as a pre-order walk, refer to [Query::encode]. Use
//! [Query::apply_elem] to evaluate against one element, or [apply] to
//! evaluate against everything below a container location.

use arbitrary::Arbitrary;

use std::{convert::TryFrom, sync::Arc};

use crate::{
    codec,
    dtype::{self, Pval},
    Dtype, Error, Result,
};

pub mod apply;

pub use apply::{apply, apply_multi, View, ViewProps, REF_ATTR, REF_OBJ, REF_REG};

/// User facing query handle.
pub type Qref = Arc<Query>;

/// Kind of a query node. A combined node reports the common kind of its
/// children, or `Misc` when they differ.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Arbitrary)]
pub enum Qtype {
    Misc,
    DataElem,
    AttrValue,
    AttrName,
    LinkName,
}

impl Qtype {
    fn to_code(&self) -> u32 {
        match self {
            Qtype::Misc => 0,
            Qtype::DataElem => 1,
            Qtype::AttrValue => 2,
            Qtype::AttrName => 3,
            Qtype::LinkName => 4,
        }
    }

    fn from_code(code: u32) -> Result<Qtype> {
        let val = match code {
            0 => Qtype::Misc,
            1 => Qtype::DataElem,
            2 => Qtype::AttrValue,
            3 => Qtype::AttrName,
            4 => Qtype::LinkName,
            code => err_at!(DecodeFail, msg: "query type {}", code)?,
        };
        Ok(val)
    }
}

/// Relational operator of a leaf. Name leaves support only `Eq` and
/// `Neq`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Arbitrary)]
pub enum MatchOp {
    Eq,
    Neq,
    Lt,
    Gt,
}

impl MatchOp {
    fn to_code(&self) -> u32 {
        match self {
            MatchOp::Eq => 0,
            MatchOp::Neq => 1,
            MatchOp::Lt => 2,
            MatchOp::Gt => 3,
        }
    }

    fn from_code(code: u32) -> Result<MatchOp> {
        let val = match code {
            0 => MatchOp::Eq,
            1 => MatchOp::Neq,
            2 => MatchOp::Lt,
            3 => MatchOp::Gt,
            code => err_at!(DecodeFail, msg: "match op {}", code)?,
        };
        Ok(val)
    }
}

/// Combine operator. `Singleton` is what [Query::combine_op] reports
/// for a leaf, it cannot be used to combine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Arbitrary)]
pub enum CombineOp {
    Singleton,
    And,
    Or,
}

impl CombineOp {
    fn to_code(&self) -> u32 {
        match self {
            CombineOp::Singleton => 0,
            CombineOp::And => 1,
            CombineOp::Or => 2,
        }
    }

    fn from_code(code: u32) -> Result<CombineOp> {
        let val = match code {
            0 => CombineOp::Singleton,
            1 => CombineOp::And,
            2 => CombineOp::Or,
            code => err_at!(DecodeFail, msg: "combine op {}", code)?,
        };
        Ok(val)
    }
}

/// One query node. Value carrying leaves copy the caller's bytes and
/// capture the native datatype; name leaves copy the name.
#[derive(Clone, Debug)]
pub enum Query {
    DataElem {
        op: MatchOp,
        dtype: Dtype,
        value: Vec<u8>,
    },
    AttrValue {
        op: MatchOp,
        dtype: Dtype,
        value: Vec<u8>,
    },
    AttrName {
        op: MatchOp,
        name: String,
    },
    LinkName {
        op: MatchOp,
        name: String,
    },
    Combine {
        qtype: Qtype,
        op: CombineOp,
        left: Qref,
        right: Qref,
    },
}

fn new_value_leaf(op: MatchOp, dtype: Dtype, value: &[u8]) -> Result<(MatchOp, Dtype, Vec<u8>)> {
    if let Dtype::Ref = dtype {
        err_at!(BadType, msg: "reference valued leaf")?;
    }
    if value.len() != dtype.size() {
        err_at!(InvalidInput, msg: "value {}b for {:?}", value.len(), dtype)?;
    }
    Ok((op, dtype, value.to_vec()))
}

fn new_name_leaf(op: MatchOp, name: &str) -> Result<(MatchOp, String)> {
    match op {
        MatchOp::Eq | MatchOp::Neq => (),
        op => err_at!(InvalidInput, msg: "{:?} on a name leaf", op)?,
    }
    if name.is_empty() {
        err_at!(InvalidInput, msg: "empty name")?;
    }
    Ok((op, name.to_string()))
}

impl Query {
    /// Create a data-element leaf, elements standing in relation `op`
    /// to `value` match.
    pub fn data_elem(op: MatchOp, dtype: Dtype, value: &[u8]) -> Result<Qref> {
        let (op, dtype, value) = new_value_leaf(op, dtype, value)?;
        Ok(Arc::new(Query::DataElem { op, dtype, value }))
    }

    /// Create an attribute-value leaf, structurally identical to
    /// [Query::data_elem] but applied to attribute elements.
    pub fn attr_value(op: MatchOp, dtype: Dtype, value: &[u8]) -> Result<Qref> {
        let (op, dtype, value) = new_value_leaf(op, dtype, value)?;
        Ok(Arc::new(Query::AttrValue { op, dtype, value }))
    }

    pub fn attr_name(op: MatchOp, name: &str) -> Result<Qref> {
        let (op, name) = new_name_leaf(op, name)?;
        Ok(Arc::new(Query::AttrName { op, name }))
    }

    pub fn link_name(op: MatchOp, name: &str) -> Result<Qref> {
        let (op, name) = new_name_leaf(op, name)?;
        Ok(Arc::new(Query::LinkName { op, name }))
    }

    /// Combine two queries into an AND/OR node. Both children's
    /// refcounts are incremented, the node's reported type is the
    /// common child type or `Misc` when they differ.
    pub fn combine(left: &Qref, op: CombineOp, right: &Qref) -> Result<Qref> {
        match op {
            CombineOp::And | CombineOp::Or => (),
            op => err_at!(InvalidInput, msg: "{:?} cannot combine", op)?,
        }
        let qtype = match (left.qtype(), right.qtype()) {
            (a, b) if a == b => a,
            _ => Qtype::Misc,
        };
        Ok(Arc::new(Query::Combine {
            qtype,
            op,
            left: Arc::clone(left),
            right: Arc::clone(right),
        }))
    }

    pub fn is_combined(&self) -> bool {
        matches!(self, Query::Combine { .. })
    }

    pub fn qtype(&self) -> Qtype {
        match self {
            Query::DataElem { .. } => Qtype::DataElem,
            Query::AttrValue { .. } => Qtype::AttrValue,
            Query::AttrName { .. } => Qtype::AttrName,
            Query::LinkName { .. } => Qtype::LinkName,
            Query::Combine { qtype, .. } => *qtype,
        }
    }

    /// Relational operator of a leaf, fails on a combined node.
    pub fn match_op(&self) -> Result<MatchOp> {
        match self {
            Query::DataElem { op, .. }
            | Query::AttrValue { op, .. }
            | Query::AttrName { op, .. }
            | Query::LinkName { op, .. } => Ok(*op),
            Query::Combine { .. } => {
                err_at!(InvalidInput, msg: "match-op of a combined query")
            }
        }
    }

    /// Children of a combined node, fails on a singleton.
    pub fn components(&self) -> Result<(Qref, Qref)> {
        match self {
            Query::Combine { left, right, .. } => {
                Ok((Arc::clone(left), Arc::clone(right)))
            }
            _ => err_at!(InvalidInput, msg: "components of a singleton"),
        }
    }

    /// `And`/`Or` for combined nodes, `Singleton` for leaves.
    pub fn combine_op(&self) -> CombineOp {
        match self {
            Query::Combine { op, .. } => *op,
            _ => CombineOp::Singleton,
        }
    }

    /// Captured native datatype of a value leaf.
    pub fn value_dtype(&self) -> Result<Dtype> {
        match self {
            Query::DataElem { dtype, .. } | Query::AttrValue { dtype, .. } => Ok(*dtype),
            _ => err_at!(InvalidInput, msg: "not a value leaf"),
        }
    }

    pub fn value_bytes(&self) -> Result<&[u8]> {
        match self {
            Query::DataElem { value, .. } | Query::AttrValue { value, .. } => Ok(value),
            _ => err_at!(InvalidInput, msg: "not a value leaf"),
        }
    }
}

fn cmp_scalar<T: PartialOrd>(op: MatchOp, x: T, y: T) -> bool {
    match op {
        MatchOp::Eq => x == y,
        MatchOp::Neq => x != y,
        MatchOp::Lt => x < y,
        MatchOp::Gt => x > y,
    }
}

fn cmp_pval(op: MatchOp, x: Pval, y: Pval) -> Result<bool> {
    let val = match (x, y) {
        (Pval::I8(x), Pval::I8(y)) => cmp_scalar(op, x, y),
        (Pval::I16(x), Pval::I16(y)) => cmp_scalar(op, x, y),
        (Pval::I32(x), Pval::I32(y)) => cmp_scalar(op, x, y),
        (Pval::I64(x), Pval::I64(y)) => cmp_scalar(op, x, y),
        (Pval::F64(x), Pval::F64(y)) => cmp_scalar(op, x, y),
        (x, y) => err_at!(Fatal, msg: "promoted pair {:?} {:?}", x, y)?,
    };
    Ok(val)
}

impl Query {
    /// Evaluate this query against one element of native type `dtype`.
    /// Both the element and the captured query value are promoted to a
    /// common type before comparing. Name leaves cannot be applied to
    /// an element.
    pub fn apply_elem(&self, dtype: Dtype, elem: &[u8]) -> Result<bool> {
        match self {
            Query::Combine { op, left, right, .. } => {
                let l = left.apply_elem(dtype, elem)?;
                let r = right.apply_elem(dtype, elem)?;
                match op {
                    CombineOp::And => Ok(l && r),
                    CombineOp::Or => Ok(l || r),
                    CombineOp::Singleton => err_at!(Fatal, msg: "singleton combine"),
                }
            }
            Query::DataElem { op, dtype: qt, value }
            | Query::AttrValue { op, dtype: qt, value } => {
                let promoted = dtype::promote(dtype, *qt)?;
                let x = dtype::to_pval(elem, dtype, promoted)?;
                let y = dtype::to_pval(value, *qt, promoted)?;
                cmp_pval(*op, x, y)
            }
            Query::AttrName { .. } | Query::LinkName { .. } => {
                err_at!(BadType, msg: "name leaf applied to an element")
            }
        }
    }

    /// Evaluate a name carrying query against a name. On a null name
    /// `Eq` yields false and `Neq` yields true.
    pub fn apply_name(&self, name: Option<&str>) -> Result<bool> {
        match self {
            Query::Combine { op, left, right, .. } => {
                let l = left.apply_name(name)?;
                let r = right.apply_name(name)?;
                match op {
                    CombineOp::And => Ok(l && r),
                    CombineOp::Or => Ok(l || r),
                    CombineOp::Singleton => err_at!(Fatal, msg: "singleton combine"),
                }
            }
            Query::AttrName { op, name: qn } | Query::LinkName { op, name: qn } => {
                let val = match (*op, name) {
                    (MatchOp::Eq, Some(name)) => name == qn,
                    (MatchOp::Eq, None) => false,
                    (MatchOp::Neq, Some(name)) => name != qn,
                    (MatchOp::Neq, None) => true,
                    (op, _) => err_at!(Fatal, msg: "{:?} on a name leaf", op)?,
                };
                Ok(val)
            }
            _ => err_at!(BadType, msg: "value leaf applied to a name"),
        }
    }

    /// Evaluate an attribute carrying query against one attribute,
    /// name leaves match the attribute name, value leaves match when
    /// any element of the attribute matches.
    pub fn apply_attr(&self, name: &str, dtype: Dtype, data: &[u8]) -> Result<bool> {
        match self {
            Query::Combine { op, left, right, .. } => {
                let l = left.apply_attr(name, dtype, data)?;
                let r = right.apply_attr(name, dtype, data)?;
                match op {
                    CombineOp::And => Ok(l && r),
                    CombineOp::Or => Ok(l || r),
                    CombineOp::Singleton => err_at!(Fatal, msg: "singleton combine"),
                }
            }
            Query::AttrName { .. } => self.apply_name(Some(name)),
            Query::AttrValue { .. } => {
                let esz = dtype.size();
                for elem in data.chunks(esz) {
                    if self.apply_elem(dtype, elem)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => err_at!(BadType, msg: "leaf {:?} applied to an attribute", self.qtype()),
        }
    }
}

/// Extract the sub-tree spanning leaves of the wanted kinds. Combined
/// nodes survive when both children do, otherwise they collapse into
/// the surviving child.
pub fn extract(q: &Qref, kinds: &[Qtype]) -> Option<Qref> {
    match q.as_ref() {
        Query::Combine { op, left, right, .. } => {
            match (extract(left, kinds), extract(right, kinds)) {
                (Some(l), Some(r)) => Some(Query::combine(&l, *op, &r).ok()?),
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            }
        }
        _ if kinds.contains(&q.qtype()) => Some(Arc::clone(q)),
        _ => None,
    }
}

/// Close a query handle. Dropping the last handle releases the node,
/// a combined node recursively releases the counts it holds on its
/// children.
pub fn close(q: Qref) {
    std::mem::drop(q)
}

/// Collect the distinct leaf kinds present in a tree.
pub fn leaf_kinds(q: &Qref) -> Vec<Qtype> {
    fn walk(q: &Query, out: &mut Vec<Qtype>) {
        match q {
            Query::Combine { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            q => {
                let kind = q.qtype();
                if !out.contains(&kind) {
                    out.push(kind)
                }
            }
        }
    }
    let mut out = vec![];
    walk(q, &mut out);
    out
}

impl Query {
    /// Serialize as a pre-order walk. Two-phase, same contract as the
    /// [codec] encoders.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.encode_size()?;
        if buf.len() < n {
            return Ok(n);
        }
        self.encode_fill(buf)
    }

    fn encode_size(&self) -> Result<usize> {
        let n = match self {
            Query::Combine { left, right, .. } => {
                1 + 4 + 4 + left.encode_size()? + right.encode_size()?
            }
            Query::DataElem { value, .. } | Query::AttrValue { value, .. } => {
                1 + 4 + 4 + 8 + 2 + 8 + value.len()
            }
            Query::AttrName { name, .. } | Query::LinkName { name, .. } => {
                1 + 4 + 4 + 8 + name.len()
            }
        };
        Ok(n)
    }

    fn encode_fill(&self, buf: &mut [u8]) -> Result<usize> {
        let mut off = 0;
        match self {
            Query::Combine { qtype, op, left, right } => {
                buf[off] = 1;
                off += 1;
                off += codec::encode_u32(qtype.to_code(), &mut buf[off..]);
                off += codec::encode_u32(op.to_code(), &mut buf[off..]);
                off += left.encode_fill(&mut buf[off..])?;
                off += right.encode_fill(&mut buf[off..])?;
            }
            Query::DataElem { op, dtype, value }
            | Query::AttrValue { op, dtype, value } => {
                buf[off] = 0;
                off += 1;
                off += codec::encode_u32(self.qtype().to_code(), &mut buf[off..]);
                off += codec::encode_u32(op.to_code(), &mut buf[off..]);
                off += codec::encode_u64(2, &mut buf[off..]);
                off += dtype.encode(&mut buf[off..]);
                off += codec::encode_u64(value.len() as u64, &mut buf[off..]);
                buf[off..off + value.len()].copy_from_slice(value);
                off += value.len();
            }
            Query::AttrName { op, name } | Query::LinkName { op, name } => {
                buf[off] = 0;
                off += 1;
                off += codec::encode_u32(self.qtype().to_code(), &mut buf[off..]);
                off += codec::encode_u32(op.to_code(), &mut buf[off..]);
                off += codec::encode_u64(name.len() as u64, &mut buf[off..]);
                buf[off..off + name.len()].copy_from_slice(name.as_bytes());
                off += name.len();
            }
        }
        Ok(off)
    }

    /// The mirror of [Query::encode], returns the decoded tree and the
    /// bytes consumed. Every decoded node starts with refcount 1.
    pub fn decode(buf: &[u8]) -> Result<(Qref, usize)> {
        check_remaining!(buf, 1, "query header")?;
        let mut off = 1;
        match buf[0] {
            1 => {
                let (tcode, n) = codec::decode_u32(&buf[off..])?;
                off += n;
                let (ocode, n) = codec::decode_u32(&buf[off..])?;
                off += n;
                Qtype::from_code(tcode)?;
                let op = CombineOp::from_code(ocode)?;
                let (left, n) = Query::decode(&buf[off..])?;
                off += n;
                let (right, n) = Query::decode(&buf[off..])?;
                off += n;
                Ok((Query::combine(&left, op, &right)?, off))
            }
            0 => {
                let (tcode, n) = codec::decode_u32(&buf[off..])?;
                off += n;
                let (ocode, n) = codec::decode_u32(&buf[off..])?;
                off += n;
                let qtype = Qtype::from_code(tcode)?;
                let op = MatchOp::from_code(ocode)?;
                match qtype {
                    Qtype::DataElem | Qtype::AttrValue => {
                        let (blob_len, n) = codec::decode_u64(&buf[off..])?;
                        off += n;
                        let blob_len = err_at!(FailConvert, usize::try_from(blob_len))?;
                        check_remaining!(buf, off + blob_len, "query dtype")?;
                        let (dtype, _) = Dtype::decode(&buf[off..off + blob_len])?;
                        off += blob_len;
                        let (esz, n) = codec::decode_u64(&buf[off..])?;
                        off += n;
                        let esz = err_at!(FailConvert, usize::try_from(esz))?;
                        check_remaining!(buf, off + esz, "query value")?;
                        let value = &buf[off..off + esz];
                        off += esz;
                        let q = match qtype {
                            Qtype::DataElem => Query::data_elem(op, dtype, value)?,
                            _ => Query::attr_value(op, dtype, value)?,
                        };
                        Ok((q, off))
                    }
                    Qtype::AttrName | Qtype::LinkName => {
                        let (name_len, n) = codec::decode_u64(&buf[off..])?;
                        off += n;
                        let name_len = err_at!(FailConvert, usize::try_from(name_len))?;
                        check_remaining!(buf, off + name_len, "query name")?;
                        let name =
                            err_at!(DecodeFail, std::str::from_utf8(&buf[off..off + name_len]))?;
                        off += name_len;
                        let q = match qtype {
                            Qtype::AttrName => Query::attr_name(op, name)?,
                            _ => Query::link_name(op, name)?,
                        };
                        Ok((q, off))
                    }
                    qtype => err_at!(DecodeFail, msg: "leaf type {:?}", qtype),
                }
            }
            byte => err_at!(DecodeFail, msg: "is_combined byte {}", byte),
        }
    }
}
