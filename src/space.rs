//! Module `space` implement dataspaces, an N-dimensional extent along
//! with an element selection. Selections are unions of block ranges and
//! enumerate in row-major dataspace order.

use std::collections::BTreeSet;
use std::convert::TryFrom;

use crate::{codec, Error, Result};

const SPACE_VER: u8 = 1;

/// Element selection over a dataspace extent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selection {
    All,
    None,
    Blocks(Vec<Block>),
}

/// One selected block, `start` and `count` must match the dataspace
/// rank. Blocks from repeated select-or calls may overlap, enumeration
/// de-duplicates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dataspace {
    dims: Vec<u64>,
    sel: Selection,
}

impl Dataspace {
    /// Create a simple dataspace, the whole extent selected.
    pub fn new(dims: Vec<u64>) -> Result<Dataspace> {
        if dims.is_empty() || dims.iter().any(|d| *d == 0) {
            err_at!(InvalidInput, msg: "invalid extent {:?}", dims)?;
        }
        Ok(Dataspace {
            dims,
            sel: Selection::All,
        })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn selection(&self) -> &Selection {
        &self.sel
    }

    /// Number of elements in the extent, ignoring the selection.
    pub fn extent_npoints(&self) -> u64 {
        self.dims.iter().product()
    }

    pub fn select_all(&mut self) {
        self.sel = Selection::All;
    }

    pub fn select_none(&mut self) {
        self.sel = Selection::None;
    }

    /// OR a block into the selection.
    pub fn select_or(&mut self, start: &[u64], count: &[u64]) -> Result<()> {
        if start.len() != self.rank() || count.len() != self.rank() {
            err_at!(InvalidInput, msg: "rank {}/{}", start.len(), self.rank())?;
        }
        for i in 0..self.rank() {
            if count[i] == 0 || start[i] + count[i] > self.dims[i] {
                err_at!(
                    InvalidInput, msg: "block [{}+{}] outside dim {}",
                    start[i], count[i], self.dims[i]
                )?;
            }
        }
        let block = Block {
            start: start.to_vec(),
            count: count.to_vec(),
        };
        match &mut self.sel {
            Selection::All => (),
            Selection::None => self.sel = Selection::Blocks(vec![block]),
            Selection::Blocks(blocks) => blocks.push(block),
        }
        Ok(())
    }

    pub fn is_selected(&self) -> bool {
        match &self.sel {
            Selection::None => false,
            Selection::All => true,
            Selection::Blocks(blocks) => !blocks.is_empty(),
        }
    }

    /// Row-major strides, `down[i]` is the number of elements spanned by
    /// one step along dimension `i`.
    pub fn down_dims(&self) -> Vec<u64> {
        let mut down = vec![1; self.rank()];
        for i in (0..self.rank() - 1).rev() {
            down[i] = down[i + 1] * self.dims[i + 1];
        }
        down
    }

    pub fn linear_to_coords(&self, linear: u64) -> Vec<u64> {
        let down = self.down_dims();
        let mut coords = Vec::with_capacity(self.rank());
        let mut rem = linear;
        for d in down.iter() {
            coords.push(rem / d);
            rem %= d;
        }
        coords
    }

    pub fn coords_to_linear(&self, coords: &[u64]) -> u64 {
        let down = self.down_dims();
        coords.iter().zip(down.iter()).map(|(c, d)| c * d).sum()
    }

    /// Selected elements as sorted, de-duplicated linear offsets, in
    /// dataspace order.
    pub fn linear_points(&self) -> Vec<u64> {
        match &self.sel {
            Selection::None => vec![],
            Selection::All => (0..self.extent_npoints()).collect(),
            Selection::Blocks(blocks) => {
                let mut points: BTreeSet<u64> = BTreeSet::new();
                for block in blocks.iter() {
                    self.block_points(block, &mut points);
                }
                points.into_iter().collect()
            }
        }
    }

    fn block_points(&self, block: &Block, points: &mut BTreeSet<u64>) {
        let mut coords = block.start.clone();
        loop {
            points.insert(self.coords_to_linear(&coords));
            // advance odometer within the block
            let mut dim = self.rank();
            loop {
                if dim == 0 {
                    return;
                }
                dim -= 1;
                coords[dim] += 1;
                if coords[dim] < block.start[dim] + block.count[dim] {
                    break;
                }
                coords[dim] = block.start[dim];
            }
        }
    }

    /// Selected elements as N-dim coordinates, in dataspace order.
    pub fn points(&self) -> Vec<Vec<u64>> {
        self.linear_points()
            .into_iter()
            .map(|linear| self.linear_to_coords(linear))
            .collect()
    }

    pub fn npoints(&self) -> u64 {
        match &self.sel {
            Selection::None => 0,
            Selection::All => self.extent_npoints(),
            Selection::Blocks(_) => self.linear_points().len() as u64,
        }
    }

    /// Bounding box of the selection as per-dimension (start, end)
    /// coordinates, end inclusive.
    pub fn bounds(&self) -> Result<(Vec<u64>, Vec<u64>)> {
        match &self.sel {
            Selection::None => err_at!(InvalidInput, msg: "empty selection"),
            Selection::All => {
                let start = vec![0; self.rank()];
                let end: Vec<u64> = self.dims.iter().map(|d| d - 1).collect();
                Ok((start, end))
            }
            Selection::Blocks(blocks) if blocks.is_empty() => {
                err_at!(InvalidInput, msg: "empty selection")
            }
            Selection::Blocks(blocks) => {
                let mut start = blocks[0].start.clone();
                let mut end: Vec<u64> = blocks[0]
                    .start
                    .iter()
                    .zip(blocks[0].count.iter())
                    .map(|(s, c)| s + c - 1)
                    .collect();
                for block in blocks[1..].iter() {
                    for i in 0..self.rank() {
                        start[i] = u64::min(start[i], block.start[i]);
                        end[i] = u64::max(end[i], block.start[i] + block.count[i] - 1);
                    }
                }
                Ok((start, end))
            }
        }
    }

    /// Selections are equal when they cover the same extent and pick
    /// the same elements, regardless of how the blocks were composed.
    pub fn selection_eq(&self, other: &Dataspace) -> bool {
        self.dims == other.dims && self.linear_points() == other.linear_points()
    }

    /// Serialize extent and selection, two-phase as with the [codec]
    /// encoders.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let rank = self.rank();
        if rank > 255 {
            err_at!(EncodeFail, msg: "rank {}", rank)?;
        }
        let mut n = 3 + rank * 8;
        if let Selection::Blocks(blocks) = &self.sel {
            n += 4 + blocks.len() * rank * 16;
        }
        if buf.len() < n {
            return Ok(n);
        }

        buf[0] = SPACE_VER;
        buf[1] = rank as u8;
        buf[2] = match &self.sel {
            Selection::All => 0,
            Selection::None => 1,
            Selection::Blocks(_) => 2,
        };
        let mut off = 3;
        for d in self.dims.iter() {
            off += codec::encode_u64(*d, &mut buf[off..]);
        }
        if let Selection::Blocks(blocks) = &self.sel {
            let m = err_at!(FailConvert, u32::try_from(blocks.len()))?;
            off += codec::encode_u32(m, &mut buf[off..]);
            for block in blocks.iter() {
                for s in block.start.iter() {
                    off += codec::encode_u64(*s, &mut buf[off..]);
                }
                for c in block.count.iter() {
                    off += codec::encode_u64(*c, &mut buf[off..]);
                }
            }
        }
        debug_assert_eq!(off, n);
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> Result<(Dataspace, usize)> {
        check_remaining!(buf, 3, "space header")?;
        if buf[0] != SPACE_VER {
            err_at!(DecodeFail, msg: "space version {}", buf[0])?;
        }
        let rank = buf[1] as usize;
        if rank == 0 {
            err_at!(DecodeFail, msg: "zero rank")?;
        }
        let kind = buf[2];
        let mut off = 3;
        let mut dims = Vec::with_capacity(rank);
        for _ in 0..rank {
            let (d, m) = codec::decode_u64(&buf[off..])?;
            dims.push(d);
            off += m;
        }
        let sel = match kind {
            0 => Selection::All,
            1 => Selection::None,
            2 => {
                let (m, k) = codec::decode_u32(&buf[off..])?;
                off += k;
                let mut blocks = Vec::with_capacity(m as usize);
                for _ in 0..m {
                    let mut start = Vec::with_capacity(rank);
                    for _ in 0..rank {
                        let (s, k) = codec::decode_u64(&buf[off..])?;
                        start.push(s);
                        off += k;
                    }
                    let mut count = Vec::with_capacity(rank);
                    for _ in 0..rank {
                        let (c, k) = codec::decode_u64(&buf[off..])?;
                        count.push(c);
                        off += k;
                    }
                    blocks.push(Block { start, count });
                }
                Selection::Blocks(blocks)
            }
            kind => err_at!(DecodeFail, msg: "selection kind {}", kind)?,
        };
        let mut space = Dataspace::new(dims)?;
        space.sel = sel;
        Ok((space, off))
    }
}

#[cfg(test)]
#[path = "space_test.rs"]
mod space_test;
