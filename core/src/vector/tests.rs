use super::*;

const EPSILON: f32 = 1e-5;

fn approx_eq(left: f32, right: f32) {
    assert!((left - right).abs() < EPSILON, "expected {left} ~= {right}");
}

fn approx_eq_tol(left: f32, right: f32, epsilon: f32) {
    assert!((left - right).abs() < epsilon, "expected {left} ~= {right}");
}

fn deterministic_vector(seed: usize, len: usize) -> Vec<f32> {
    (0..len)
        .map(|index| {
            let mixed = seed
                .wrapping_mul(1_103_515_245)
                .wrapping_add(index.wrapping_mul(12_345))
                .wrapping_add(97);
            let base = (mixed % 10_000) as f32 / 5_000.0;
            base - 1.0
        })
        .collect()
}

#[test]
fn dot_product_works() {
    let score = dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).expect("dot should succeed");
    approx_eq(score, 32.0);
}

#[test]
fn euclidean_distance_works() {
    let distance =
        euclidean_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 6.0]).expect("l2 should succeed");
    approx_eq(distance, 3.0);
}

#[test]
fn cosine_similarity_of_orthogonal_and_parallel_vectors() {
    let orthogonal = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("cosine should succeed");
    approx_eq(orthogonal, 0.0);

    let parallel = cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]).expect("cosine should succeed");
    approx_eq(parallel, 1.0);
}

#[test]
fn zero_norm_yields_zero_similarity() {
    let value = cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).expect("zero norm is not an error");
    approx_eq(value, 0.0);

    let distance = cosine_distance(&[0.0, 0.0], &[1.0, 2.0]).expect("must succeed");
    approx_eq(distance, 1.0);
}

#[test]
fn cosine_distance_is_unclamped_for_anti_parallel_vectors() {
    let distance = cosine_distance(&[1.0, 0.0], &[-3.0, 0.0]).expect("must succeed");
    approx_eq(distance, 2.0);
}

#[test]
fn errors_on_dimension_mismatch() {
    let error = dot_product(&[1.0, 2.0], &[1.0]).expect_err("must fail");
    assert!(matches!(
        error,
        VectorError::DimensionMismatch { left: 2, right: 1 }
    ));

    let error = cosine_similarity(&[1.0], &[1.0, 0.0]).expect_err("must fail");
    assert!(matches!(
        error,
        VectorError::DimensionMismatch { left: 1, right: 2 }
    ));
}

#[test]
fn validate_vector_rejects_empty_and_non_finite() {
    assert!(matches!(
        validate_vector(&[]),
        Err(VectorError::EmptyVector)
    ));
    assert!(matches!(
        validate_vector(&[1.0, f32::NAN]),
        Err(VectorError::NonFinite { index: 1, .. })
    ));
    assert!(matches!(
        validate_finite(&[f32::INFINITY]),
        Err(VectorError::NonFinite { index: 0, .. })
    ));
    validate_vector(&[0.5, -0.5]).expect("finite vector must pass");
}

#[test]
fn prepared_cosine_matches_cosine_similarity() {
    for len in [1usize, 2, 3, 7, 8, 9, 16, 17, 64, 65, 127, 128, 129] {
        let query = deterministic_vector(23, len);
        let candidate = deterministic_vector(47, len);
        let prepared = PreparedCosineQuery::new(&query);
        let prepared_value = prepared.similarity(&candidate).expect("same dimension");
        let reference = cosine_similarity(&query, &candidate).expect("cosine must succeed");
        approx_eq_tol(prepared_value, reference, 1e-4);
    }
}

#[test]
fn prepared_cosine_reports_dimension_mismatch() {
    let prepared = PreparedCosineQuery::new(&[1.0, 0.0, 0.0]);
    assert_eq!(prepared.dimension(), 3);
    let error = prepared.distance(&[1.0, 0.0]).expect_err("must fail");
    assert!(matches!(
        error,
        VectorError::DimensionMismatch { left: 3, right: 2 }
    ));
}

#[test]
fn prepared_cosine_handles_zero_norm_query() {
    let prepared = PreparedCosineQuery::new(&[0.0, 0.0]);
    let distance = prepared.distance(&[1.0, 2.0]).expect("must succeed");
    approx_eq(distance, 1.0);
}

#[test]
fn cosine_stays_finite_when_f32_norms_overflow() {
    let query = [1e20f32, 0.0];
    let parallel = [1e20f32, 0.0];
    let diagonal = [1e20f32, 1e20];

    let similarity = cosine_similarity(&query, &diagonal).expect("same dimension");
    assert!(similarity.is_finite());
    approx_eq(similarity, std::f32::consts::FRAC_1_SQRT_2);
    approx_eq(cosine_distance(&query, &parallel).expect("same dimension"), 0.0);

    let prepared = PreparedCosineQuery::new(&query);
    let to_parallel = prepared.distance(&parallel).expect("same dimension");
    let to_diagonal = prepared.distance(&diagonal).expect("same dimension");
    assert!(to_parallel.is_finite() && to_diagonal.is_finite());
    assert!(to_parallel < to_diagonal);
    approx_eq(to_diagonal, 1.0 - std::f32::consts::FRAC_1_SQRT_2);
}

#[test]
fn cosine_survives_f32_underflow_of_tiny_components() {
    let left = [1e-25f32, 0.0];
    let right = [1e-25f32, 1e-25];
    approx_eq(
        cosine_similarity(&left, &right).expect("same dimension"),
        std::f32::consts::FRAC_1_SQRT_2,
    );
    approx_eq(
        PreparedCosineQuery::new(&left)
            .similarity(&right)
            .expect("same dimension"),
        std::f32::consts::FRAC_1_SQRT_2,
    );
}

#[test]
fn large_dimension_smoke() {
    let left = vec![1.0f32; 4096];
    let right = vec![2.0f32; 4096];
    let value = dot_product(&left, &right).expect("must succeed");
    approx_eq(value, 8192.0);
}

#[test]
fn simd_paths_match_scalar_reference_across_varied_dimensions() {
    for len in [1usize, 2, 3, 7, 8, 9, 15, 16, 17, 31, 32, 33, 127, 128, 129] {
        let left = deterministic_vector(11, len);
        let right = deterministic_vector(29, len);

        let dot = dot_product(&left, &right).expect("dot must succeed");
        let dot_reference: f32 = left.iter().zip(&right).map(|(l, r)| l * r).sum();
        approx_eq_tol(dot, dot_reference, 1e-3);

        let l2 = euclidean_distance(&left, &right).expect("l2 must succeed");
        let l2_reference = left
            .iter()
            .zip(&right)
            .map(|(l, r)| {
                let delta = l - r;
                delta * delta
            })
            .sum::<f32>()
            .sqrt();
        approx_eq_tol(l2, l2_reference, 1e-4);

        let cosine = cosine_similarity(&left, &right).expect("cosine must succeed");
        let left_norm: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
        let right_norm: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();
        let cosine_reference = dot_reference / (left_norm * right_norm);
        approx_eq_tol(cosine, cosine_reference, 1e-4);
    }
}
