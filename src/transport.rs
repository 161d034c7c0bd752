//! Module `transport` implement the rank style collective used by the
//! multi-file apply. The core makes no concurrency assumptions beyond
//! this trait, callers bring the transport of their choice.

use log::info;

use std::{sync::mpsc, thread};

use crate::{
    query::{apply_multi, View, ViewProps},
    Error, Ffile, Qref, Result,
};

/// Collective communicator, a rank within a fixed-size set.
pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;
}

/// Single-rank communicator.
pub struct Solo;

impl Comm for Solo {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

/// Fixed rank within a set of `size` ranks.
pub struct Ranked {
    rank: usize,
    size: usize,
}

impl Ranked {
    pub fn new(rank: usize, size: usize) -> Result<Ranked> {
        if size == 0 || rank >= size {
            err_at!(InvalidInput, msg: "rank {}/{}", rank, size)?;
        }
        Ok(Ranked { rank, size })
    }
}

impl Comm for Ranked {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Run the multi-file apply across `nranks` in-process ranks, one
/// thread per rank, and gather every rank's views ordered by file
/// index.
pub fn fanout_files(
    files: &[Ffile],
    q: &Qref,
    props: &ViewProps,
    nranks: usize,
) -> Result<Vec<(usize, View)>> {
    if nranks == 0 {
        err_at!(InvalidInput, msg: "zero ranks")?;
    }
    info!(target: "transport", "fanout {} files over {} ranks", files.len(), nranks);

    let (tx, rx) = mpsc::channel();
    let mut handles = vec![];
    for rank in 0..nranks {
        let files = files.to_vec();
        let q = Qref::clone(q);
        let props = props.clone();
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let res = Ranked::new(rank, nranks)
                .and_then(|comm| apply_multi(&files, &q, &props, &comm));
            tx.send(res).ok();
        }));
    }
    drop(tx);

    let mut views = vec![];
    for res in rx.iter() {
        views.extend(res?);
    }
    for handle in handles.into_iter() {
        if let Err(err) = handle.join() {
            err_at!(ThreadFail, msg: "fanout rank {:?}", err)?;
        }
    }
    views.sort_by_key(|(i, _)| *i);
    Ok(views)
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
