use rand::{prelude::random, rngs::StdRng, Rng, SeedableRng};

use std::sync::Arc;

use super::*;

#[test]
fn test_build_deconstruct() {
    let column = "test_engine_build";
    let values: Vec<f64> = vec![3.0, 1.0, 2.0, 1.0, 3.0, 3.0];
    register_array(column, Ftype::Double, values).unwrap();
    assert!(is_registered(column).unwrap());
    assert_eq!(column_type(column).unwrap(), Ftype::Double);

    build_index(column).unwrap();
    let (keys, offsets, words) = deconstruct_index(column).unwrap();
    assert_eq!(keys, vec![1.0, 2.0, 3.0]);
    assert_eq!(offsets.len(), keys.len() + 1);
    assert_eq!(*offsets.last().unwrap() as usize, words.len());

    // each key selects exactly its rows
    let mut pick = selection_osr(column, Fcmp::Eq, 1.0);
    assert_eq!(pick.evaluate().unwrap(), 2);
    assert_eq!(pick.coordinates().unwrap(), &[1, 3]);

    let mut pick = selection_osr(column, Fcmp::Gt, 1.5);
    assert_eq!(pick.evaluate().unwrap(), 4);
    assert_eq!(pick.coordinates().unwrap(), &[0, 2, 4, 5]);

    let mut pick = selection_osr(column, Fcmp::Lt, 3.0);
    assert_eq!(pick.evaluate().unwrap(), 3);
    assert_eq!(pick.coordinates().unwrap(), &[1, 2, 3]);

    let mut pick = selection_osr(column, Fcmp::Neq, 3.0);
    assert_eq!(pick.evaluate().unwrap(), 3);
    assert_eq!(pick.coordinates().unwrap(), &[1, 2, 3]);

    drop_column(column).unwrap();
    assert!(!is_registered(column).unwrap());
}

#[test]
fn test_register_index_only() {
    let column = "test_engine_packed";
    let values: Vec<f64> = vec![5.5, 4.5, 5.5, 6.5, 4.5];
    register_array(column, Ftype::Float, values.clone()).unwrap();
    build_index(column).unwrap();
    let (keys, offsets, words) = deconstruct_index(column).unwrap();
    drop_column(column).unwrap();

    let words = Arc::new(words);
    let reader: Reader = {
        let words = Arc::clone(&words);
        Box::new(move |start: u64, count: u64| {
            let (start, count) = (start as usize, count as usize);
            Ok(words[start..start + count].to_vec())
        })
    };
    register_array_index_only(
        column,
        Ftype::Float,
        values.len() as u64,
        keys,
        offsets,
        reader,
    )
    .unwrap();

    let mut pick = selection_osr(column, Fcmp::Eq, 5.5);
    assert_eq!(pick.evaluate().unwrap(), 2);
    assert_eq!(pick.coordinates().unwrap(), &[0, 2]);

    let mut pick = selection_osr(column, Fcmp::Gt, 4.5);
    assert_eq!(pick.evaluate().unwrap(), 3);
    assert_eq!(pick.coordinates().unwrap(), &[0, 2, 3]);

    drop_column(column).unwrap();
}

#[test]
fn test_packed_matches_data() {
    let seed: u64 = random();
    println!("test_packed_matches_data seed:{}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let column = "test_engine_equiv";
    let values: Vec<f64> = (0..10_000).map(|_| rng.gen_range(0..32) as f64).collect();
    register_array(column, Ftype::Long, values.clone()).unwrap();
    build_index(column).unwrap();
    let (keys, offsets, words) = deconstruct_index(column).unwrap();

    let data_hits = {
        let mut pick = selection_osr(column, Fcmp::Lt, 7.0);
        pick.evaluate().unwrap();
        pick.coordinates().unwrap().to_vec()
    };
    drop_column(column).unwrap();

    let words = Arc::new(words);
    let reader: Reader = {
        let words = Arc::clone(&words);
        Box::new(move |start: u64, count: u64| {
            let (start, count) = (start as usize, count as usize);
            Ok(words[start..start + count].to_vec())
        })
    };
    register_array_index_only(column, Ftype::Long, 10_000, keys, offsets, reader).unwrap();
    let packed_hits = {
        let mut pick = selection_osr(column, Fcmp::Lt, 7.0);
        pick.evaluate().unwrap();
        pick.coordinates().unwrap().to_vec()
    };
    drop_column(column).unwrap();

    assert_eq!(data_hits, packed_hits);
    let brute: Vec<u64> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < 7.0)
        .map(|(i, _)| i as u64)
        .collect();
    assert_eq!(data_hits, brute);
}

#[test]
fn test_errors() {
    assert!(build_index("test_engine_missing").is_err());
    assert!(deconstruct_index("test_engine_missing").is_err());
    let mut pick = selection_osr("test_engine_missing", Fcmp::Eq, 0.0);
    assert!(pick.evaluate().is_err());
    assert!(pick.coordinates().is_err());

    let column = "test_engine_unbuilt";
    register_array(column, Ftype::Int, vec![1.0]).unwrap();
    assert!(deconstruct_index(column).is_err());
    let mut pick = selection_osr(column, Fcmp::Eq, 1.0);
    assert!(pick.evaluate().is_err());
    drop_column(column).unwrap();

    // offsets must bracket the keys
    assert!(register_array_index_only(
        "test_engine_badoffsets",
        Ftype::Int,
        1,
        vec![1.0],
        vec![0],
        Box::new(|_, _| Ok(vec![])),
    )
    .is_err());
}
