use super::*;
use crate::{
    index::{self, IndexProps, PLUGIN_BITMAP, PLUGIN_DUMMY},
    CombineOp, MatchOp, Query,
};

// the original harness took these on the command line
const OBJECT_COUNT: usize = 3;
const DATA_PLUGIN_ID: u32 = PLUGIN_DUMMY;

const NTUPLES: u64 = 256;

fn f32_bytes(vals: &[f32]) -> Vec<u8> {
    let mut data = vec![];
    for v in vals.iter() {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data
}

// Three groups Object1..Object3, each with f32[256] datasets Pressure
// and Temperature where each element's index is its value, and an i32
// attribute SensorID equal to the group index.
fn fixture(name: &str) -> Ffile {
    let file = Ffile::create(name);
    let mut c = file.wr().unwrap();
    let root = c.root();
    let vals: Vec<f32> = (0..NTUPLES).map(|i| i as f32).collect();
    for i in 1..=OBJECT_COUNT {
        let grp = c.create_group(root, &format!("Object{}", i)).unwrap();
        for dname in ["Pressure", "Temperature"].iter() {
            let space = Dataspace::new(vec![NTUPLES]).unwrap();
            let dset = c
                .create_dataset(grp, dname, Dtype::Float32, space)
                .unwrap();
            c.write_dataset(dset, &f32_bytes(&vals)).unwrap();
            c.create_attr(
                dset,
                "SensorID",
                Dtype::Int32,
                Dataspace::new(vec![1]).unwrap(),
                (i as i32).to_le_bytes().to_vec(),
            )
            .unwrap();
        }
    }
    drop(c);
    file
}

fn range_query() -> Qref {
    let gt = Query::data_elem(MatchOp::Gt, Dtype::Float64, &17.0_f64.to_le_bytes()).unwrap();
    let lt = Query::data_elem(MatchOp::Lt, Dtype::Float64, &22.0_f64.to_le_bytes()).unwrap();
    Query::combine(&gt, CombineOp::And, &lt).unwrap()
}

fn link_attr_query() -> Qref {
    let link = Query::link_name(MatchOp::Eq, "Pressure").unwrap();
    let aname = Query::attr_name(MatchOp::Eq, "SensorID").unwrap();
    let avalue = Query::attr_value(MatchOp::Eq, Dtype::Int32, &2_i32.to_le_bytes()).unwrap();
    let attr = Query::combine(&aname, CombineOp::And, &avalue).unwrap();
    Query::combine(&link, CombineOp::And, &attr).unwrap()
}

// S4: (17 < x < 22) && (link = Pressure) && (attr = SensorID) && (attr = 2)
#[test]
fn test_region_apply() {
    let file = fixture("test_region_apply.qrx");
    let root = file.rd().unwrap().root();

    let q = Query::combine(&range_query(), CombineOp::And, &link_attr_query()).unwrap();
    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    assert_eq!(view.mask, REF_REG);

    let refs = view.regions(&file).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].get_obj_name(&file).unwrap(), "/Object2/Pressure");

    let region = refs[0].get_region().unwrap();
    assert_eq!(region.npoints(), 4);
    assert_eq!(region.bounds().unwrap(), (vec![18], vec![21]));

    assert!(view.objects(&file).unwrap().is_empty());
    assert!(view.attributes(&file).unwrap().is_empty());
    view.close(&file).unwrap();
}

// S4 again, but served through the per-dataset index plug-in.
#[test]
fn test_region_apply_indexed() {
    let file = fixture("test_region_apply_indexed.qrx");
    let root = file.rd().unwrap().root();
    {
        let c = file.rd().unwrap();
        let dsets: Vec<Addr> = c
            .visit(root)
            .unwrap()
            .into_iter()
            .filter(|(_, addr)| !c.is_group(*addr).unwrap())
            .map(|(_, addr)| addr)
            .collect();
        drop(c);
        for dset in dsets.into_iter() {
            index::create(&file, dset, DATA_PLUGIN_ID, &IndexProps::new())
                .unwrap()
                .close()
                .unwrap();
        }
    }

    let q = Query::combine(&range_query(), CombineOp::And, &link_attr_query()).unwrap();
    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    assert_eq!(view.mask, REF_REG);

    let refs = view.regions(&file).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].get_obj_name(&file).unwrap(), "/Object2/Pressure");
    assert_eq!(refs[0].get_region().unwrap().npoints(), 4);
    view.close(&file).unwrap();
}

// S5: (link = Pressure) && (attr = SensorID) && (attr = 2)
#[test]
fn test_object_apply() {
    let file = fixture("test_object_apply.qrx");
    let root = file.rd().unwrap().root();

    let view = apply(&file, root, &link_attr_query(), &ViewProps::new()).unwrap();
    assert_eq!(view.mask, REF_OBJ);

    let refs = view.objects(&file).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].get_obj_name(&file).unwrap(), "/Object2/Pressure");

    assert!(view.regions(&file).unwrap().is_empty());
    view.close(&file).unwrap();
}

// S6: (attr = SensorID) && (attr = 2)
#[test]
fn test_attr_apply() {
    let file = fixture("test_attr_apply.qrx");
    let root = file.rd().unwrap().root();

    let aname = Query::attr_name(MatchOp::Eq, "SensorID").unwrap();
    let avalue = Query::attr_value(MatchOp::Eq, Dtype::Int32, &2_i32.to_le_bytes()).unwrap();
    let q = Query::combine(&aname, CombineOp::And, &avalue).unwrap();

    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    assert_eq!(view.mask, REF_ATTR);

    let refs = view.attributes(&file).unwrap();
    let mut got: Vec<(String, String)> = refs
        .iter()
        .map(|r| {
            (
                r.get_obj_name(&file).unwrap(),
                r.get_attr_name().unwrap(),
            )
        })
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            ("/Object2/Pressure".to_string(), "SensorID".to_string()),
            ("/Object2/Temperature".to_string(), "SensorID".to_string()),
        ]
    );
    view.close(&file).unwrap();
}

#[test]
fn test_view_props() {
    let file = fixture("test_view_props.qrx");
    let root = file.rd().unwrap().root();

    let mut props = ViewProps::new();
    props.set_allow(REF_OBJ | REF_ATTR);
    let q = Query::combine(&range_query(), CombineOp::And, &link_attr_query()).unwrap();
    let view = apply(&file, root, &q, &props).unwrap();
    assert_eq!(view.mask, 0);
    assert!(view.regions(&file).unwrap().is_empty());
    view.close(&file).unwrap();
}

#[test]
fn test_view_close() {
    let file = fixture("test_view_close.qrx");
    let root = file.rd().unwrap().root();

    let q = Query::combine(&range_query(), CombineOp::And, &link_attr_query()).unwrap();
    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    let group = view.group;
    assert!(file.rd().unwrap().exists(group));
    view.close(&file).unwrap();
    assert!(!file.rd().unwrap().exists(group));
}

// rehydrated references carry a location back to their container
#[test]
fn test_view_ref_locations() {
    let file = fixture("test_view_ref_locations.qrx");
    let root = file.rd().unwrap().root();

    let q = Query::combine(&range_query(), CombineOp::And, &link_attr_query()).unwrap();
    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    let refs = view.regions(&file).unwrap();
    let id = refs[0].loc().unwrap();
    assert_eq!(
        crate::store::loc_file(id).unwrap().to_name().unwrap(),
        "test_view_ref_locations.qrx"
    );
    view.close(&file).unwrap();
}

// the bitmap plug-in serves singleton leaves inside an apply as well
#[test]
fn test_apply_bitmap_singleton() {
    let file = fixture("test_apply_bitmap_singleton.qrx");
    let root = file.rd().unwrap().root();
    {
        let c = file.rd().unwrap();
        let dset = c.resolve(root, "Object1/Pressure").unwrap();
        drop(c);
        index::create(&file, dset, PLUGIN_BITMAP, &IndexProps::new())
            .unwrap()
            .close()
            .unwrap();
    }

    let gt = Query::data_elem(MatchOp::Gt, Dtype::Float64, &253.0_f64.to_le_bytes()).unwrap();
    let link = Query::link_name(MatchOp::Eq, "Pressure").unwrap();
    let q = Query::combine(&gt, CombineOp::And, &link).unwrap();

    let view = apply(&file, root, &q, &ViewProps::new()).unwrap();
    assert_eq!(view.mask, REF_REG);
    let refs = view.regions(&file).unwrap();
    assert_eq!(refs.len(), OBJECT_COUNT);
    for r in refs.iter() {
        let region = r.get_region().unwrap();
        assert_eq!(region.npoints(), 2);
        assert_eq!(region.bounds().unwrap(), (vec![254], vec![255]));
    }
    view.close(&file).unwrap();
}
