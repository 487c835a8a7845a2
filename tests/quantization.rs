//! End-to-end quantization scenarios.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use binquant::{
    quantize, BinarizationOptions, BorderSelectionType, FloatValuesHolder, HashedCatValuesHolder,
    NanMode, ObjectsOrder, Parallelism, QuantizationOptions, QuantizeError, QuantizedDataProvider,
    QuantizedFeaturesInfo, RawDataProvider, run_with_threads,
};

fn info_for(
    raw: &RawDataProvider,
    binarization: BinarizationOptions,
) -> Arc<QuantizedFeaturesInfo> {
    Arc::new(QuantizedFeaturesInfo::new(
        binarization,
        raw.float_features().len(),
        raw.cat_features().len(),
    ))
}

fn run(
    options: &QuantizationOptions,
    raw: Arc<RawDataProvider>,
    info: Arc<QuantizedFeaturesInfo>,
    seed: u64,
) -> Result<QuantizedDataProvider, QuantizeError> {
    let mut rng = StdRng::seed_from_u64(seed);
    quantize(options, raw, info, &mut rng, Parallelism::Sequential)
}

#[test]
fn nan_feature_with_min_policy_gets_low_bucket() {
    // one nan among ten values, three borders requested: the nan decodes to
    // bucket 0 and an extra bottom border keeps finite values above it
    let values = vec![1.0, 2.0, 2.0, 3.0, f32::NAN, 5.0, 6.0, 7.0, 8.0, 9.0];
    let raw = Arc::new(RawDataProvider::from_columns(
        10,
        vec![FloatValuesHolder::new(0, values.clone())],
        vec![],
    ));
    let binarization = BinarizationOptions::builder()
        .border_count(3)
        .nan_mode(NanMode::Min)
        .build();
    let info = info_for(&raw, binarization);

    let quantized = run(&QuantizationOptions::default(), raw, Arc::clone(&info), 0).unwrap();

    let (nan_mode, borders) = info.borders_and_nan_mode(0).unwrap().unwrap();
    assert_eq!(nan_mode, NanMode::Min);
    assert_eq!(borders[0], f32::MIN);

    let column = &quantized.float_features()[0];
    assert_eq!(column.bucket(4).unwrap(), 0); // the nan row
    for i in (0..10).filter(|&i| i != 4) {
        assert!(column.bucket(i).unwrap() >= 1, "row {}", i);
    }
    // bucket codes preserve value order
    assert!(column.bucket(0).unwrap() <= column.bucket(9).unwrap());
}

#[test]
fn mixed_columns_quantize_end_to_end() {
    let n = 256u32;
    let float_a: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let float_b: Vec<f32> = (0..n).map(|i| ((i * 31) % 7) as f32).collect();
    let cats: Vec<u32> = (0..n).map(|i| 1000 + (i % 5)).collect();

    let raw = Arc::new(RawDataProvider::from_columns(
        n,
        vec![
            FloatValuesHolder::new(0, float_a.clone()),
            FloatValuesHolder::new(1, float_b),
        ],
        vec![HashedCatValuesHolder::new(2, cats.clone())],
    ));
    let info = info_for(&raw, BinarizationOptions::builder().border_count(15).build());

    let quantized = run_with_threads(2, |parallelism| {
        let mut rng = StdRng::seed_from_u64(0);
        quantize(
            &QuantizationOptions::default(),
            raw,
            Arc::clone(&info),
            &mut rng,
            parallelism,
        )
    })
    .unwrap();

    assert_eq!(quantized.object_count(), n);
    assert_eq!(quantized.float_features().len(), 2);
    assert_eq!(quantized.cat_features().len(), 1);

    // output rows are in plain logical order
    assert!(quantized.subset_indexing().is_full());
    assert_eq!(quantized.subset_indexing().size(), n);

    // monotone raw values give monotone bucket codes
    let column = &quantized.float_features()[0];
    assert!(column.is_packed());
    let mut prev = 0u32;
    for i in 0..n {
        let bucket = column.bucket(i).unwrap();
        assert!(bucket >= prev, "bucket order broken at row {}", i);
        prev = bucket;
    }
    assert!(prev > 0);

    // five distinct tokens, codes in first-seen order
    let cat_column = &quantized.cat_features()[0];
    assert_eq!(info.perfect_hash_len(0), 5);
    for i in 0..n {
        assert_eq!(cat_column.code(i).unwrap(), i % 5);
    }
}

#[test]
fn forbidden_nan_mode_rejects_nan_input() {
    let raw = Arc::new(RawDataProvider::from_columns(
        3,
        vec![FloatValuesHolder::new(0, vec![1.0, f32::NAN, 3.0])],
        vec![],
    ));
    let binarization = BinarizationOptions::builder()
        .nan_mode(NanMode::Forbidden)
        .build();
    let info = info_for(&raw, binarization);

    let err = run(&QuantizationOptions::default(), raw, info, 0).unwrap_err();
    assert!(matches!(err, QuantizeError::NansForbidden { feature: 0 }));
    assert!(err.is_invalid_configuration());
}

#[test]
fn nan_outside_border_sample_surfaces_during_packing() {
    // the nan sits past the sampled prefix, so border calculation never sees
    // it and the effective mode stays Forbidden; packing then hits it
    let n = 1000u32;
    let mut values: Vec<f32> = (0..n).map(|i| i as f32).collect();
    values[500] = f32::NAN;
    let raw = Arc::new(
        RawDataProvider::from_columns(n, vec![FloatValuesHolder::new(0, values)], vec![])
            .with_objects_order(ObjectsOrder::RandomShuffled),
    );
    let binarization = BinarizationOptions::builder()
        .border_count(8)
        .border_selection_type(BorderSelectionType::GreedyLogSum)
        .nan_mode(NanMode::Forbidden)
        .build();
    let info = info_for(&raw, binarization);
    let options = QuantizationOptions::builder()
        .max_subset_size_for_slow_border_algorithms(100)
        .build();

    let err = run(&options, raw, info, 0).unwrap_err();
    assert!(matches!(err, QuantizeError::UnexpectedNan { feature: 0 }));
    assert!(err.is_invalid_configuration());
}

#[test]
fn requesting_no_output_format_is_rejected() {
    let raw = Arc::new(RawDataProvider::from_columns(
        1,
        vec![FloatValuesHolder::new(0, vec![1.0])],
        vec![],
    ));
    let info = info_for(&raw, BinarizationOptions::default());
    let options = QuantizationOptions::builder()
        .cpu_compatible_format(false)
        .gpu_compatible_format(false)
        .build();

    let err = run(&options, raw, info, 0).unwrap_err();
    assert!(matches!(err, QuantizeError::NoOutputFormat));
}

#[test]
fn lazy_gpu_columns_match_packed_cpu_columns() {
    let n = 100u32;
    let floats: Vec<f32> = (0..n).map(|i| ((i * 13) % 29) as f32 / 3.0).collect();
    let cats: Vec<u32> = (0..n).map(|i| (i * 7) % 11).collect();

    let make_raw = || {
        Arc::new(RawDataProvider::from_columns(
            n,
            vec![FloatValuesHolder::new(0, floats.clone())],
            vec![HashedCatValuesHolder::new(1, cats.clone())],
        ))
    };
    let binarization = BinarizationOptions::builder().border_count(10).build();

    // packed run: engine is the sole owner of raw
    let info_packed = Arc::new(QuantizedFeaturesInfo::new(binarization.clone(), 1, 1));
    let packed = run(
        &QuantizationOptions::default(),
        make_raw(),
        Arc::clone(&info_packed),
        0,
    )
    .unwrap();

    // lazy run: gpu format only, raw stays shared with the caller
    let raw = make_raw();
    let keep_alive = Arc::clone(&raw);
    let info_lazy = Arc::new(QuantizedFeaturesInfo::new(binarization, 1, 1));
    let options = QuantizationOptions::builder()
        .cpu_compatible_format(false)
        .gpu_compatible_format(true)
        .build();
    let lazy = run(&options, raw, Arc::clone(&info_lazy), 0).unwrap();

    assert!(packed.float_features()[0].is_packed());
    assert!(!lazy.float_features()[0].is_packed());
    assert!(!lazy.cat_features()[0].is_packed());

    for i in 0..n {
        assert_eq!(
            packed.float_features()[0].bucket(i).unwrap(),
            lazy.float_features()[0].bucket(i).unwrap(),
            "float row {}",
            i
        );
        assert_eq!(
            packed.cat_features()[0].code(i).unwrap(),
            lazy.cat_features()[0].code(i).unwrap(),
            "cat row {}",
            i
        );
    }
    drop(keep_alive);
}

#[test]
fn metadata_is_reused_across_chunks() {
    let binarization = BinarizationOptions::builder().border_count(4).build();
    let info = Arc::new(QuantizedFeaturesInfo::new(binarization, 1, 1));
    let options = QuantizationOptions::default();

    let chunk1 = Arc::new(RawDataProvider::from_columns(
        6,
        vec![FloatValuesHolder::new(0, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
        vec![HashedCatValuesHolder::new(1, vec![10, 20, 10, 30, 20, 10])],
    ));
    let q1 = run(&options, chunk1, Arc::clone(&info), 0).unwrap();
    let (_, borders_after_chunk1) = info.borders_and_nan_mode(0).unwrap().unwrap();

    // second chunk has a wider value range and new tokens; borders must not
    // move and old tokens must keep their codes
    let chunk2 = Arc::new(RawDataProvider::from_columns(
        4,
        vec![FloatValuesHolder::new(0, vec![100.0, -100.0, 3.5, 2.0])],
        vec![HashedCatValuesHolder::new(1, vec![30, 40, 10, 20])],
    ));
    let q2 = run(&options, chunk2, Arc::clone(&info), 0).unwrap();

    let (_, borders_after_chunk2) = info.borders_and_nan_mode(0).unwrap().unwrap();
    assert_eq!(&*borders_after_chunk1, &*borders_after_chunk2);

    // out-of-range values clamp to the edge buckets
    let column = &q2.float_features()[0];
    assert_eq!(
        column.bucket(0).unwrap(),
        borders_after_chunk2.len() as u32
    );
    assert_eq!(column.bucket(1).unwrap(), 0);

    // token 10 was seen first in chunk 1 and keeps code 0; 40 is new
    assert_eq!(q1.cat_features()[0].code(0).unwrap(), 0);
    assert_eq!(q2.cat_features()[0].code(2).unwrap(), 0);
    assert_eq!(q2.cat_features()[0].code(1).unwrap(), 3);
    assert_eq!(info.perfect_hash_len(0), 4);
}

#[test]
fn subsampled_border_calculation_is_reproducible() {
    let n = 5000u32;
    let values: Vec<f32> = (0..n)
        .map(|i| (i.wrapping_mul(2654435761) % 997) as f32)
        .collect();
    let binarization = BinarizationOptions::builder()
        .border_count(32)
        .border_selection_type(BorderSelectionType::GreedyLogSum)
        .build();
    let options = QuantizationOptions::builder()
        .max_subset_size_for_slow_border_algorithms(500)
        .build();

    let borders_for_seed = |seed: u64| {
        let raw = Arc::new(RawDataProvider::from_columns(
            n,
            vec![FloatValuesHolder::new(0, values.clone())],
            vec![],
        ));
        let info = Arc::new(QuantizedFeaturesInfo::new(binarization.clone(), 1, 0));
        run(&options, raw, Arc::clone(&info), seed).unwrap();
        let (_, borders) = info.borders_and_nan_mode(0).unwrap().unwrap();
        borders
    };

    assert_eq!(&*borders_for_seed(42), &*borders_for_seed(42));
    assert!(borders_for_seed(42).len() <= 32);
}

#[test]
fn shuffled_order_samples_the_prefix() {
    let n = 1000u32;
    // values sorted ascending: a prefix sample sees only the low range
    let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
    let raw = Arc::new(
        RawDataProvider::from_columns(n, vec![FloatValuesHolder::new(0, values)], vec![])
            .with_objects_order(ObjectsOrder::RandomShuffled),
    );
    let binarization = BinarizationOptions::builder()
        .border_count(8)
        .border_selection_type(BorderSelectionType::GreedyLogSum)
        .build();
    let info = info_for(&raw, binarization);
    let options = QuantizationOptions::builder()
        .max_subset_size_for_slow_border_algorithms(100)
        .build();

    run(&options, raw, Arc::clone(&info), 0).unwrap();

    let (_, borders) = info.borders_and_nan_mode(0).unwrap().unwrap();
    assert!(borders.iter().all(|&b| b < 100.0));
}

#[test]
fn tiny_memory_budget_still_quantizes_everything() {
    let n = 200u32;
    let raw = Arc::new(RawDataProvider::from_columns(
        n,
        (0..8)
            .map(|id| FloatValuesHolder::new(id, (0..n).map(|i| (i + id) as f32).collect()))
            .collect(),
        vec![HashedCatValuesHolder::new(8, (0..n).collect())],
    ));
    let info = info_for(&raw, BinarizationOptions::default());
    // every task exceeds this budget, forcing one-at-a-time execution
    let options = QuantizationOptions::builder().cpu_ram_limit(1).build();

    let quantized = run(&options, raw, Arc::clone(&info), 0).unwrap();
    assert_eq!(quantized.float_features().len(), 8);
    for column in quantized.float_features() {
        assert!(column.is_packed());
        assert!(column.bucket(n - 1).unwrap() > column.bucket(0).unwrap());
    }
    assert_eq!(info.perfect_hash_len(0), n as usize);
}
