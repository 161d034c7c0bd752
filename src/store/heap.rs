//! Module `heap` implement the container's global heap, an auxiliary
//! area addressed by `(address, index)` pairs. Heap objects back the
//! disk placement of references and the legacy compat encodings.

use std::collections::BTreeMap;

use crate::{Error, Result};

// Objects per heap collection, a fresh collection address is allocated
// once the index rolls over.
const HEAP_FANOUT: u32 = 64;

// Heap collection addresses live in their own namespace, keep them away
// from object addresses to catch mixups early.
const HEAP_BASE: u64 = 0x8000_0000;

#[derive(Clone, Debug, Default)]
pub struct Heap {
    cur_addr: u64,
    cur_idx: u32,
    objs: BTreeMap<(u64, u32), Vec<u8>>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            cur_addr: HEAP_BASE,
            cur_idx: 0,
            objs: BTreeMap::new(),
        }
    }

    /// Insert an object, returns its `(address, index)` locator.
    pub fn insert(&mut self, data: Vec<u8>) -> (u64, u32) {
        if self.cur_idx >= HEAP_FANOUT {
            self.cur_addr += 1;
            self.cur_idx = 0;
        }
        let loc = (self.cur_addr, self.cur_idx);
        self.cur_idx += 1;
        self.objs.insert(loc, data);
        loc
    }

    pub fn read(&self, addr: u64, idx: u32) -> Result<&[u8]> {
        match self.objs.get(&(addr, idx)) {
            Some(data) => Ok(data),
            None => err_at!(NotFound, msg: "heap object ({}, {})", addr, idx),
        }
    }

    pub fn remove(&mut self, addr: u64, idx: u32) -> Result<Vec<u8>> {
        match self.objs.remove(&(addr, idx)) {
            Some(data) => Ok(data),
            None => err_at!(NotFound, msg: "heap object ({}, {})", addr, idx),
        }
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub(crate) fn to_entries(&self) -> Vec<(u64, u32, Vec<u8>)> {
        self.objs
            .iter()
            .map(|((addr, idx), data)| (*addr, *idx, data.clone()))
            .collect()
    }

    pub(crate) fn from_entries(
        cur_addr: u64,
        cur_idx: u32,
        entries: Vec<(u64, u32, Vec<u8>)>,
    ) -> Heap {
        let mut heap = Heap::new();
        heap.cur_addr = cur_addr;
        heap.cur_idx = cur_idx;
        for (addr, idx, data) in entries.into_iter() {
            heap.objs.insert((addr, idx), data);
        }
        heap
    }

    pub(crate) fn cursor(&self) -> (u64, u32) {
        (self.cur_addr, self.cur_idx)
    }
}

#[cfg(test)]
#[path = "heap_test.rs"]
mod heap_test;
