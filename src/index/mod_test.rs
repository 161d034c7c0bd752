use std::sync::Arc;

use super::*;
use crate::{CombineOp, MatchOp, Query};

fn f32_bytes(vals: &[f32]) -> Vec<u8> {
    let mut data = vec![];
    for v in vals.iter() {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data
}

fn fixture(name: &str) -> (Ffile, Addr) {
    let file = Ffile::create(name);
    let dset = {
        let mut c = file.wr().unwrap();
        let root = c.root();
        let space = Dataspace::new(vec![256]).unwrap();
        let dset = c
            .create_dataset(root, "dataset1", Dtype::Float32, space)
            .unwrap();
        let vals: Vec<f32> = (0..256).map(|i| i as f32).collect();
        c.write_dataset(dset, &f32_bytes(&vals)).unwrap();
        dset
    };
    (file, dset)
}

fn range_query() -> Qref {
    let gt = Query::data_elem(MatchOp::Gt, Dtype::Float64, &39.1_f64.to_le_bytes()).unwrap();
    let lt = Query::data_elem(MatchOp::Lt, Dtype::Float64, &42.6_f64.to_le_bytes()).unwrap();
    Query::combine(&gt, CombineOp::And, &lt).unwrap()
}

#[test]
fn test_lifecycle() {
    let (file, dset) = fixture("test_index_lifecycle.qrx");
    assert_eq!(count(&file, dset).unwrap(), 0);
    assert!(open(&file, dset).is_err());

    let idx = create(&file, dset, PLUGIN_DUMMY, &IndexProps::new()).unwrap();
    assert_eq!(count(&file, dset).unwrap(), 1);
    assert!(idx.get_size().unwrap() >= 256 * 4);
    idx.close().unwrap();

    // a second index on the same dataset is refused
    assert!(create(&file, dset, PLUGIN_DUMMY, &IndexProps::new()).is_err());

    let mut idx = open(&file, dset).unwrap();
    let out = idx.query(&range_query()).unwrap();
    assert_eq!(out.npoints(), 3);
    assert_eq!(out.bounds().unwrap(), (vec![40], vec![42]));
    idx.close().unwrap();

    let anon = {
        let rec = file.rd().unwrap().index_of(dset).unwrap().unwrap();
        crate::codec::decode_u64(&rec.metadata).unwrap().0
    };
    assert!(file.rd().unwrap().exists(anon));

    remove(&file, dset).unwrap();
    assert_eq!(count(&file, dset).unwrap(), 0);
    // the anonymous dataset became unreachable
    assert!(!file.rd().unwrap().exists(anon));
    assert!(remove(&file, dset).is_err());
}

#[test]
fn test_building_exclusive() {
    let (file, dset) = fixture("test_index_building.qrx");
    // a build already in flight rejects the create
    assert!(file.wr().unwrap().latch_building(dset).unwrap());
    let err = create(&file, dset, PLUGIN_DUMMY, &IndexProps::new()).unwrap_err();
    assert!(matches!(err, Error::CantCreate(_, _)), "{}", err);
    file.wr().unwrap().unlatch_building(dset).unwrap();

    create(&file, dset, PLUGIN_DUMMY, &IndexProps::new())
        .unwrap()
        .close()
        .unwrap();
}

#[test]
fn test_write_through_index() {
    let (file, dset) = fixture("test_index_write.qrx");
    create(&file, dset, PLUGIN_DUMMY, &IndexProps::new())
        .unwrap()
        .close()
        .unwrap();

    // overwrite elements 40..=42 with values outside the range
    let mut sel = Dataspace::new(vec![256]).unwrap();
    sel.select_none();
    sel.select_or(&[40], &[3]).unwrap();
    write_dataset(&file, dset, &sel, &f32_bytes(&[0.0, 0.0, 0.0])).unwrap();

    let mut idx = open(&file, dset).unwrap();
    let out = idx.query(&range_query()).unwrap();
    assert_eq!(out.npoints(), 0);
    idx.close().unwrap();

    // unindexed datasets write straight through
    let other = {
        let mut c = file.wr().unwrap();
        let root = c.root();
        let space = Dataspace::new(vec![4]).unwrap();
        c.create_dataset(root, "dataset2", Dtype::Float32, space)
            .unwrap()
    };
    let all = Dataspace::new(vec![4]).unwrap();
    write_dataset(&file, other, &all, &f32_bytes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
    assert_eq!(
        file.rd().unwrap().read_dataset(other).unwrap(),
        f32_bytes(&[1.0, 2.0, 3.0, 4.0])
    );
}

#[test]
fn test_query_dataset_fallback() {
    let (file, dset) = fixture("test_index_fallback.qrx");
    // no index persisted, brute-force scan
    let out = query_dataset(&file, dset, &range_query()).unwrap();
    assert_eq!(out.npoints(), 3);
    assert_eq!(out.bounds().unwrap(), (vec![40], vec![42]));
}

struct Nox;

impl Plugin for Nox {
    fn to_id(&self) -> u32 {
        77
    }

    fn to_class(&self) -> Class {
        Class::Metadata
    }

    fn create(
        &self,
        _file: &Ffile,
        _dset: Addr,
        _props: &IndexProps,
    ) -> Result<(Box<dyn Indexer>, Vec<u8>)> {
        err_at!(Unsupported, msg: "nox")
    }

    fn open(&self, _file: &Ffile, _dset: Addr, _metadata: &[u8]) -> Result<Box<dyn Indexer>> {
        err_at!(Unsupported, msg: "nox")
    }

    fn remove(&self, _file: &Ffile, _metadata: &[u8]) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_registry() {
    register_plugin(Arc::new(Nox)).unwrap();
    // duplicate ids are refused
    assert!(register_plugin(Arc::new(Nox)).is_err());
    assert_eq!(lookup_plugin(77).unwrap().to_class(), Class::Metadata);

    // a failing plugin create leaves the dataset un-indexed and unlatched
    let (file, dset) = fixture("test_index_registry.qrx");
    assert!(create(&file, dset, 77, &IndexProps::new()).is_err());
    assert_eq!(count(&file, dset).unwrap(), 0);
    create(&file, dset, PLUGIN_DUMMY, &IndexProps::new())
        .unwrap()
        .close()
        .unwrap();

    unregister_plugin(77).unwrap();
    assert!(unregister_plugin(77).is_err());
    assert!(lookup_plugin(PLUGIN_DUMMY).is_ok());
    assert!(lookup_plugin(PLUGIN_BITMAP).is_ok());
}
