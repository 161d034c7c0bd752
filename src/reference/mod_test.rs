use super::*;
use crate::{store, Dtype};

fn fixture(name: &str) -> (Ffile, Addr) {
    let file = Ffile::create(name);
    {
        let mut c = file.wr().unwrap();
        let root = c.root();
        let g = c.create_group(root, "Object1").unwrap();
        let space = Dataspace::new(vec![16]).unwrap();
        let dset = c
            .create_dataset(g, "Pressure", Dtype::Float32, space)
            .unwrap();
        c.create_attr(
            dset,
            "SensorID",
            Dtype::Int32,
            Dataspace::new(vec![1]).unwrap(),
            1_i32.to_le_bytes().to_vec(),
        )
        .unwrap();
    }
    let root = file.rd().unwrap().root();
    (file, root)
}

#[test]
fn test_create() {
    let (file, root) = fixture("test_ref_create.qrx");

    let r = Ref::create_object(&file, root, "Object1/Pressure").unwrap();
    assert_eq!(r.rtype(), Rtype::Object2);
    assert_eq!(r.get_obj_name(&file).unwrap(), "/Object1/Pressure");
    assert!(Ref::create_object(&file, root, "Object9").is_err());

    let mut space = Dataspace::new(vec![16]).unwrap();
    space.select_none();
    space.select_or(&[2], &[3]).unwrap();
    let r = Ref::create_region(&file, root, "Object1/Pressure", &space).unwrap();
    assert_eq!(r.rtype(), Rtype::Region2);
    assert!(r.get_region().unwrap().selection_eq(&space));

    let mut empty = Dataspace::new(vec![16]).unwrap();
    empty.select_none();
    assert!(Ref::create_region(&file, root, "Object1/Pressure", &empty).is_err());

    let r = Ref::create_attr(&file, root, "Object1/Pressure", "SensorID").unwrap();
    assert_eq!(r.rtype(), Rtype::Attr);
    assert_eq!(r.get_attr_name().unwrap(), "SensorID");
    assert!(Ref::create_attr(&file, root, "Object1/Pressure", "Missing").is_err());

    let long = "a".repeat(MAX_ATTR_NAME);
    assert!(Ref::create_attr(&file, root, "Object1/Pressure", &long).is_err());

    let r = Ref::create_ext_object(&file, root, "Object1").unwrap();
    assert_eq!(r.get_file_name().unwrap(), "test_ref_create.qrx");
}

#[test]
fn test_equal_copy() {
    let (file, root) = fixture("test_ref_equal.qrx");

    let a = Ref::create_object(&file, root, "Object1/Pressure").unwrap();
    let b = Ref::create_object(&file, root, "Object1/Pressure").unwrap();
    let c = Ref::create_object(&file, root, "Object1").unwrap();
    assert!(a.equal(&a));
    assert!(a.equal(&b));
    assert!(!a.equal(&c));

    let copy = a.copy().unwrap();
    assert!(copy.equal(&a));

    let mut space = Dataspace::new(vec![16]).unwrap();
    space.select_none();
    space.select_or(&[2], &[3]).unwrap();
    let r = Ref::create_region(&file, root, "Object1/Pressure", &space).unwrap();
    assert!(r.equal(&r.copy().unwrap()));
    // differing types never compare equal
    assert!(!r.equal(&a));

    let x = Ref::create_attr(&file, root, "Object1/Pressure", "SensorID").unwrap();
    assert!(x.equal(&x.copy().unwrap()));
    assert!(!x.equal(&a));
}

#[test]
fn test_encode_decode() {
    let (file, root) = fixture("test_ref_encode.qrx");

    let mut space = Dataspace::new(vec![16]).unwrap();
    space.select_none();
    space.select_or(&[2], &[3]).unwrap();

    let refs = vec![
        Ref::create_object(&file, root, "Object1/Pressure").unwrap(),
        Ref::create_region(&file, root, "Object1/Pressure", &space).unwrap(),
        Ref::create_attr(&file, root, "Object1/Pressure", "SensorID").unwrap(),
    ];
    for r in refs.iter() {
        let n = r.encode(&mut []).unwrap();
        assert!(n >= 2, "{}", n);
        let mut buf = vec![0; n];
        assert_eq!(r.encode(&mut buf).unwrap(), n);
        assert_eq!(buf[0], ENCODE_VERSION);

        let (out, m) = Ref::decode(&buf).unwrap();
        assert_eq!(m, n);
        assert!(out.equal(r));
        assert_eq!(out.loc(), None);
    }

    // region round-trip preserves the exact selection
    let n = refs[1].encode(&mut []).unwrap();
    let mut buf = vec![0; n];
    refs[1].encode(&mut buf).unwrap();
    let (out, _) = Ref::decode(&buf).unwrap();
    assert!(out.get_region().unwrap().selection_eq(&space));

    // corrupt version byte
    buf[0] = 0xFF;
    assert!(Ref::decode(&buf).is_err());
    // legacy type byte on the v1 path
    buf[0] = ENCODE_VERSION;
    buf[1] = Rtype::Object1 as u8;
    assert!(Ref::decode(&buf).is_err());
    // truncated
    assert!(Ref::decode(&buf[..1]).is_err());
}

#[test]
fn test_loc_attach() {
    let (file, root) = fixture("test_ref_loc.qrx");
    let id = store::register_loc(&file).unwrap();
    assert_eq!(store::loc_count(id).unwrap(), 1);

    {
        let mut r = Ref::create_object(&file, root, "Object1").unwrap();
        r.attach_loc(id).unwrap();
        assert_eq!(store::loc_count(id).unwrap(), 2);

        let copy = r.copy().unwrap();
        assert_eq!(copy.loc(), Some(id));
        assert_eq!(store::loc_count(id).unwrap(), 3);
        // copy and original both release on drop
    }
    assert_eq!(store::loc_count(id).unwrap(), 1);
    store::decr_loc(id).unwrap();
}
