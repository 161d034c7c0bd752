//! Module `engine` implement the binned bitmap engine behind the
//! bitmap index plug-in.
//!
//! Columns register process-wide under a caller supplied name. Building
//! an index bins the column's rows per distinct value, one roaring
//! bitmap of row ids per bin. A built index deconstructs into three
//! flat arrays suitable for persistence,
//!
//! * `keys`, the distinct values, sorted ascending, as f64.
//! * `offsets`, word offset of each key's bitmap segment within the
//!   bitmap array, with one extra entry marking the end.
//! * `bitmaps`, the serialized bitmaps packed into little-endian u32
//!   words; each segment leads with one word holding the byte length
//!   of the serialized bitmap.
//!
//! The mirror registration path takes those arrays back, with a reader
//! callback that slices bitmap words on demand, so a column can be
//! queried without rebuilding.

use croaring::bitmap::Bitmap;
use lazy_static::lazy_static;
use log::debug;

use std::{collections::HashMap, convert::TryFrom, sync::RwLock};

use crate::{Error, Result};

/// Value type of a registered column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ftype {
    Byte,
    Short,
    Int,
    Long,
    ULong,
    Float,
    Double,
}

/// Comparator for [selection_osr].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fcmp {
    Eq,
    Neq,
    Lt,
    Gt,
}

/// Reader callback, `(start-word, word-count)` to bitmap words.
pub type Reader = Box<dyn Fn(u64, u64) -> Result<Vec<u32>> + Send + Sync>;

// bitmaps are kept croaring-serialized so the process-wide registry
// stays Send/Sync, deserialize on evaluation
struct Bins {
    keys: Vec<f64>,
    maps: Vec<Vec<u8>>,
}

enum Column {
    Data {
        ftype: Ftype,
        values: Vec<f64>,
        bins: Option<Bins>,
    },
    Packed {
        ftype: Ftype,
        nrows: u64,
        keys: Vec<f64>,
        offsets: Vec<i64>,
        reader: Reader,
    },
}

lazy_static! {
    static ref COLUMNS: RwLock<HashMap<String, Column>> = RwLock::new(HashMap::new());
}

/// Register a column with its raw values, replacing any earlier
/// registration of the same name.
pub fn register_array(column: &str, ftype: Ftype, values: Vec<f64>) -> Result<()> {
    let mut columns = err_at!(Fatal, COLUMNS.write())?;
    columns.insert(
        column.to_string(),
        Column::Data {
            ftype,
            values,
            bins: None,
        },
    );
    Ok(())
}

/// Register a column from deconstructed index arrays only, no raw
/// values. `reader` hands back bitmap words on demand.
pub fn register_array_index_only(
    column: &str,
    ftype: Ftype,
    nrows: u64,
    keys: Vec<f64>,
    offsets: Vec<i64>,
    reader: Reader,
) -> Result<()> {
    if offsets.len() != keys.len() + 1 {
        err_at!(InvalidInput, msg: "{} offsets for {} keys", offsets.len(), keys.len())?;
    }
    let mut columns = err_at!(Fatal, COLUMNS.write())?;
    columns.insert(
        column.to_string(),
        Column::Packed {
            ftype,
            nrows,
            keys,
            offsets,
            reader,
        },
    );
    Ok(())
}

pub fn is_registered(column: &str) -> Result<bool> {
    let columns = err_at!(Fatal, COLUMNS.read())?;
    Ok(columns.contains_key(column))
}

pub fn column_type(column: &str) -> Result<Ftype> {
    let columns = err_at!(Fatal, COLUMNS.read())?;
    match columns.get(column) {
        Some(Column::Data { ftype, .. }) => Ok(*ftype),
        Some(Column::Packed { ftype, .. }) => Ok(*ftype),
        None => err_at!(NotFound, msg: "column {:?}", column),
    }
}

pub fn drop_column(column: &str) -> Result<()> {
    let mut columns = err_at!(Fatal, COLUMNS.write())?;
    columns.remove(column);
    Ok(())
}

pub fn drop_columns() -> Result<()> {
    let mut columns = err_at!(Fatal, COLUMNS.write())?;
    columns.clear();
    Ok(())
}

/// Bin a registered data column per distinct value.
pub fn build_index(column: &str) -> Result<()> {
    let mut columns = err_at!(Fatal, COLUMNS.write())?;
    let col = match columns.get_mut(column) {
        Some(col) => col,
        None => err_at!(NotFound, msg: "column {:?}", column)?,
    };
    match col {
        Column::Packed { .. } => {
            err_at!(CantCreate, msg: "column {:?} is index-only", column)
        }
        Column::Data { values, bins, .. } => {
            let mut by_key: HashMap<u64, Bitmap> = HashMap::new();
            for (row, val) in values.iter().enumerate() {
                let row = err_at!(FailConvert, u32::try_from(row))?;
                by_key
                    .entry(val.to_bits())
                    .or_insert_with(Bitmap::create)
                    .add(row);
            }
            let mut keys: Vec<f64> = by_key.keys().map(|bits| f64::from_bits(*bits)).collect();
            keys.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let maps = keys
                .iter()
                .map(|key| by_key.remove(&key.to_bits()).unwrap().serialize())
                .collect();
            debug!(target: "bitmapx", "built {:?}, {} bins", column, keys.len());
            *bins = Some(Bins { keys, maps });
            Ok(())
        }
    }
}

/// Deconstruct a built index into its three persistence arrays.
pub fn deconstruct_index(column: &str) -> Result<(Vec<f64>, Vec<i64>, Vec<u32>)> {
    let columns = err_at!(Fatal, COLUMNS.read())?;
    let bins = match columns.get(column) {
        Some(Column::Data { bins: Some(bins), .. }) => bins,
        Some(Column::Data { bins: None, .. }) => {
            err_at!(CantCreate, msg: "column {:?} not built", column)?
        }
        Some(Column::Packed { .. }) => {
            err_at!(CantCreate, msg: "column {:?} is index-only", column)?
        }
        None => err_at!(NotFound, msg: "column {:?}", column)?,
    };

    let mut offsets: Vec<i64> = Vec::with_capacity(bins.keys.len() + 1);
    let mut words: Vec<u32> = vec![];
    for data in bins.maps.iter() {
        offsets.push(err_at!(FailConvert, i64::try_from(words.len()))?);
        words.push(err_at!(FailConvert, u32::try_from(data.len()))?);
        for chunk in data.chunks(4) {
            let mut scratch = [0_u8; 4];
            scratch[..chunk.len()].copy_from_slice(chunk);
            words.push(u32::from_le_bytes(scratch));
        }
    }
    offsets.push(err_at!(FailConvert, i64::try_from(words.len()))?);
    Ok((bins.keys.clone(), offsets, words))
}

/// Pending threshold selection over one column, build with
/// [selection_osr], then [Pick::evaluate] and [Pick::coordinates].
pub struct Pick {
    column: String,
    cmp: Fcmp,
    threshold: f64,
    hits: Option<Vec<u64>>,
}

pub fn selection_osr(column: &str, cmp: Fcmp, threshold: f64) -> Pick {
    Pick {
        column: column.to_string(),
        cmp,
        threshold,
        hits: None,
    }
}

fn pick_keys(keys: &[f64], cmp: Fcmp, threshold: f64) -> Vec<usize> {
    keys.iter()
        .enumerate()
        .filter(|(_, key)| match cmp {
            Fcmp::Eq => **key == threshold,
            Fcmp::Neq => **key != threshold,
            Fcmp::Lt => **key < threshold,
            Fcmp::Gt => **key > threshold,
        })
        .map(|(i, _)| i)
        .collect()
}

fn unpack_segment(offsets: &[i64], reader: &Reader, i: usize) -> Result<Bitmap> {
    let start = err_at!(FailConvert, u64::try_from(offsets[i]))?;
    let end = err_at!(FailConvert, u64::try_from(offsets[i + 1]))?;
    let words = reader(start, end - start)?;
    if words.is_empty() {
        err_at!(DecodeFail, msg: "empty bitmap segment {}", i)?;
    }
    let nbytes = words[0] as usize;
    let mut data = Vec::with_capacity((words.len() - 1) * 4);
    for word in words[1..].iter() {
        data.extend_from_slice(&word.to_le_bytes());
    }
    if nbytes > data.len() {
        err_at!(DecodeFail, msg: "bitmap segment {} {}b of {}b", i, data.len(), nbytes)?;
    }
    data.truncate(nbytes);
    Ok(Bitmap::deserialize(&data))
}

impl Pick {
    /// Evaluate the selection, returns the number of hits.
    pub fn evaluate(&mut self) -> Result<i64> {
        let columns = err_at!(Fatal, COLUMNS.read())?;
        let col = match columns.get(&self.column) {
            Some(col) => col,
            None => err_at!(NotFound, msg: "column {:?}", self.column)?,
        };

        let (union, limit) = match col {
            Column::Data { bins: None, .. } => {
                err_at!(CantOpen, msg: "column {:?} not built", self.column)?
            }
            Column::Data { bins: Some(bins), .. } => {
                let mut union = Bitmap::create();
                for i in pick_keys(&bins.keys, self.cmp, self.threshold) {
                    union = union.or(&Bitmap::deserialize(&bins.maps[i]));
                }
                (union, None)
            }
            Column::Packed {
                keys,
                offsets,
                reader,
                nrows,
                ..
            } => {
                let mut union = Bitmap::create();
                for i in pick_keys(keys, self.cmp, self.threshold) {
                    union = union.or(&unpack_segment(offsets, reader, i)?);
                }
                (union, Some(*nrows))
            }
        };

        let hits: Vec<u64> = union.to_vec().into_iter().map(|row| row as u64).collect();
        if let (Some(limit), Some(last)) = (limit, hits.last()) {
            if *last >= limit {
                err_at!(Fatal, msg: "row id {} past {} rows", last, limit)?;
            }
        }
        let n = err_at!(FailConvert, i64::try_from(hits.len()))?;
        debug!(
            target: "bitmapx",
            "{:?} {:?} {} -> {} hits", self.column, self.cmp, self.threshold, n
        );
        self.hits = Some(hits);
        Ok(n)
    }

    /// Linear row coordinates of the hits, ascending. Valid after
    /// [Pick::evaluate].
    pub fn coordinates(&self) -> Result<&[u64]> {
        match &self.hits {
            Some(hits) => Ok(hits),
            None => err_at!(InvalidInput, msg: "selection not evaluated"),
        }
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
