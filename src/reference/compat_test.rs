use super::*;
use crate::{Dataspace, Dtype};

fn fixture(name: &str) -> (Ffile, u64) {
    let file = Ffile::create(name);
    {
        let mut c = file.wr().unwrap();
        let root = c.root();
        let space = Dataspace::new(vec![8]).unwrap();
        c.create_dataset(root, "d", Dtype::Int32, space).unwrap();
    }
    let root = file.rd().unwrap().root();
    (file, root)
}

#[test]
fn test_compat_object() {
    let (file, root) = fixture("test_compat_object.qrx");
    let r = Ref::create_object(&file, root, "d").unwrap();

    let n = encode_compat(&r, &file, &mut []).unwrap();
    assert_eq!(n, locator_size(8));
    // the size probe must not touch the heap
    assert_eq!(file.rd().unwrap().heap_len(), 0);

    let mut buf = vec![0; n];
    assert_eq!(encode_compat(&r, &file, &mut buf).unwrap(), n);
    assert_eq!(file.rd().unwrap().heap_len(), 1);

    let (out, m) = decode_compat(&buf, &file, Rtype::Object1).unwrap();
    assert_eq!(m, n);
    assert!(out.equal(&r));

    // wrong expected legacy type
    assert!(decode_compat(&buf, &file, Rtype::Region1).is_err());
}

#[test]
fn test_compat_region() {
    let (file, root) = fixture("test_compat_region.qrx");
    let mut space = Dataspace::new(vec![8]).unwrap();
    space.select_none();
    space.select_or(&[1], &[4]).unwrap();
    let r = Ref::create_region(&file, root, "d", &space).unwrap();

    let n = encode_compat(&r, &file, &mut []).unwrap();
    let mut buf = vec![0; n];
    encode_compat(&r, &file, &mut buf).unwrap();

    let (out, _) = decode_compat(&buf, &file, Rtype::Region1).unwrap();
    assert!(out.get_region().unwrap().selection_eq(&space));
}

#[test]
fn test_compat_attr_refused() {
    let (file, root) = fixture("test_compat_attr.qrx");
    {
        let mut c = file.wr().unwrap();
        let dset = c.resolve(root, "d").unwrap();
        c.create_attr(
            dset,
            "SensorID",
            Dtype::Int32,
            Dataspace::new(vec![1]).unwrap(),
            0_i32.to_le_bytes().to_vec(),
        )
        .unwrap();
    }
    let r = Ref::create_attr(&file, root, "d", "SensorID").unwrap();
    assert!(encode_compat(&r, &file, &mut vec![0; 64]).is_err());
}
