use super::*;
use crate::{
    index::{self, IndexProps},
    CombineOp, MatchOp, Query,
};

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

// S1: d[i] = i over f32[256], query (39.1 < x) && (x < 42.6)
fn s1_query() -> Qref {
    let gt = Query::data_elem(MatchOp::Gt, Dtype::Float64, &39.1_f64.to_le_bytes()).unwrap();
    let lt = Query::data_elem(MatchOp::Lt, Dtype::Float64, &42.6_f64.to_le_bytes()).unwrap();
    Query::combine(&gt, CombineOp::And, &lt).unwrap()
}

#[test]
fn test_elementary_predicate() {
    let (file, dset) = fixture("test_dummy_s1.qrx");
    let mut idx = index::create(&file, dset, index::PLUGIN_DUMMY, &IndexProps::new()).unwrap();

    let out = idx.query(&s1_query()).unwrap();
    assert_eq!(out.npoints(), 3);
    assert_eq!(out.bounds().unwrap(), (vec![40], vec![42]));
    assert_eq!(out.linear_points(), vec![40, 41, 42]);
    idx.close().unwrap();
}

#[test]
fn test_metadata_blob() {
    let (file, dset) = fixture("test_dummy_metadata.qrx");
    index::create(&file, dset, index::PLUGIN_DUMMY, &IndexProps::new())
        .unwrap()
        .close()
        .unwrap();

    let rec = file.rd().unwrap().index_of(dset).unwrap().unwrap();
    assert_eq!(rec.plugin_id, index::PLUGIN_DUMMY);
    assert_eq!(rec.metadata.len(), 8);
    let (anon, _) = codec::decode_u64(&rec.metadata).unwrap();
    let c = file.rd().unwrap();
    assert_eq!(c.refn(anon).unwrap(), 1);
    // the duplicate mirrors the dataset
    assert_eq!(c.read_dataset(anon).unwrap(), c.read_dataset(dset).unwrap());
}

#[test]
fn test_deferred_build() {
    let (file, dset) = fixture("test_dummy_deferred.qrx");
    let mut props = IndexProps::new();
    props.set_read_on_create(false);
    let mut idx = index::create(&file, dset, index::PLUGIN_DUMMY, &props).unwrap();

    // nothing copied yet, the duplicate is zero-filled
    let out = idx.query(&s1_query()).unwrap();
    assert_eq!(out.npoints(), 0);
    idx.close().unwrap();

    // a full-extent write through the framework populates it
    let all = Dataspace::new(vec![256]).unwrap();
    let vals: Vec<f32> = (0..256).map(|i| i as f32).collect();
    index::write_dataset(&file, dset, &all, &f32_bytes(&vals)).unwrap();

    let mut idx = index::open(&file, dset).unwrap();
    let out = idx.query(&s1_query()).unwrap();
    assert_eq!(out.npoints(), 3);
    idx.close().unwrap();
}

#[test]
fn test_post_update_scatter() {
    let (file, dset) = fixture("test_dummy_scatter.qrx");
    index::create(&file, dset, index::PLUGIN_DUMMY, &IndexProps::new())
        .unwrap()
        .close()
        .unwrap();

    // move the only matching values out of range, through the blessed
    // write path
    let mut sel = Dataspace::new(vec![256]).unwrap();
    sel.select_none();
    sel.select_or(&[40], &[3]).unwrap();
    index::write_dataset(&file, dset, &sel, &f32_bytes(&[100.0, 100.0, 100.0])).unwrap();

    let mut idx = index::open(&file, dset).unwrap();
    assert_eq!(idx.query(&s1_query()).unwrap().npoints(), 0);

    let eq = Query::data_elem(MatchOp::Eq, Dtype::Float64, &100.0_f64.to_le_bytes()).unwrap();
    let out = idx.query(&eq).unwrap();
    // elements 40..=42 plus the original d[100]
    assert_eq!(out.linear_points(), vec![40, 41, 42, 100]);
    idx.close().unwrap();
}

#[test]
fn test_get_size() {
    let (file, dset) = fixture("test_dummy_size.qrx");
    let idx = index::create(&file, dset, index::PLUGIN_DUMMY, &IndexProps::new()).unwrap();
    assert_eq!(idx.get_size().unwrap(), 256 * 4);
    idx.close().unwrap();
}
