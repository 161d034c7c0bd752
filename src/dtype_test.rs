use arbitrary::{Arbitrary, Unstructured};
use rand::{prelude::random, rngs::StdRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_dtype_blob() {
    let seed: u64 = random();
    println!("test_dtype_blob seed:{}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..100 {
        let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        let mut uns = Unstructured::new(&bytes);
        let dt = Dtype::arbitrary(&mut uns).unwrap();

        let mut buf = vec![];
        assert_eq!(dt.encode(&mut buf), 2);
        buf.resize(2, 0);
        dt.encode(&mut buf);
        let (out, n) = Dtype::decode(&buf).unwrap();
        assert_eq!(n, 2);
        match dt {
            // the blob does not record a reference element width
            Dtype::Ref => assert_eq!(out, Dtype::Ref),
            dt => assert_eq!(out, dt),
        }
    }

    assert!(Dtype::decode(&[9, 4]).is_err());
    assert!(Dtype::decode(&[1]).is_err());
}

#[test]
fn test_promote() {
    assert_eq!(promote(Dtype::Int8, Dtype::Int8).unwrap(), Promoted::I8);
    assert_eq!(promote(Dtype::Int8, Dtype::Int32).unwrap(), Promoted::I32);
    assert_eq!(promote(Dtype::Int64, Dtype::Int16).unwrap(), Promoted::I64);
    assert_eq!(promote(Dtype::Float32, Dtype::Int32).unwrap(), Promoted::F64);
    assert_eq!(promote(Dtype::Float64, Dtype::Float32).unwrap(), Promoted::F64);
    assert_eq!(promote(Dtype::Int32, Dtype::Float64).unwrap(), Promoted::F64);

    assert!(promote(Dtype::UInt32, Dtype::Int32).is_err());
    assert!(promote(Dtype::Float64, Dtype::UInt8).is_err());
    assert!(promote(Dtype::Ref, Dtype::Int32).is_err());
}

#[test]
fn test_to_pval() {
    let bytes = 42_i32.to_le_bytes();
    assert_eq!(to_pval(&bytes, Dtype::Int32, Promoted::I64).unwrap(), Pval::I64(42));
    assert_eq!(to_pval(&bytes, Dtype::Int32, Promoted::F64).unwrap(), Pval::F64(42.0));

    let bytes = 39.5_f32.to_le_bytes();
    assert_eq!(
        to_pval(&bytes, Dtype::Float32, Promoted::F64).unwrap(),
        Pval::F64(39.5)
    );

    let bytes = (-7_i8).to_le_bytes();
    assert_eq!(to_pval(&bytes, Dtype::Int8, Promoted::I16).unwrap(), Pval::I16(-7));

    // element width must match the native type
    assert!(to_pval(&[0; 3], Dtype::Int32, Promoted::I32).is_err());
}

#[test]
fn test_value_as_f64() {
    assert_eq!(value_as_f64(&25_i32.to_le_bytes(), Dtype::Int32).unwrap(), 25.0);
    assert_eq!(value_as_f64(&25_u64.to_le_bytes(), Dtype::UInt64).unwrap(), 25.0);
    assert_eq!(
        value_as_f64(&21.2_f32.to_le_bytes(), Dtype::Float32).unwrap(),
        21.2_f32 as f64
    );
    assert!(value_as_f64(&25_u16.to_le_bytes(), Dtype::UInt16).is_err());
}

#[test]
fn test_scalar_arrays() {
    let seed: u64 = random();
    println!("test_scalar_arrays seed:{}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let keys: Vec<f64> = (0..100).map(|_| rng.gen()).collect();
    assert_eq!(bytes_to_f64s(&f64s_to_bytes(&keys)).unwrap(), keys);

    let offsets: Vec<i64> = (0..100).map(|_| rng.gen()).collect();
    assert_eq!(bytes_to_i64s(&i64s_to_bytes(&offsets)).unwrap(), offsets);

    let words: Vec<u32> = (0..100).map(|_| rng.gen()).collect();
    assert_eq!(bytes_to_u32s(&u32s_to_bytes(&words)).unwrap(), words);

    assert!(bytes_to_f64s(&[0; 7]).is_err());
    assert!(bytes_to_u32s(&[0; 5]).is_err());
}
