//! Similarity metrics and small dense-vector helpers.
//!
//! Everything here works on plain `&[f32]` slices so that the memory,
//! training and inference layers share one set of numeric primitives.
//!
//! When compiled with the `simd` feature, the dot product uses a
//! SIMD-accelerated implementation on supported hardware.

/// Available similarity metrics for memory recall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    /// Cosine similarity (scale-invariant)
    Cosine,
    /// Raw inner product
    Dot,
    /// Negative Euclidean distance (0 for identical vectors)
    NegEuclidean,
}

/// Similarity computation for dense `f32` vectors.
///
/// All pairwise functions compare the common prefix of both slices, so a
/// caller can restrict a comparison to the leading `d` dimensions simply by
/// slicing.
pub struct Similarity;

impl Similarity {
    /// Compute similarity using the specified metric.
    pub fn compute(a: &[f32], b: &[f32], metric: Metric) -> f32 {
        match metric {
            Metric::Cosine => Self::cosine(a, b),
            Metric::Dot => Self::dot(a, b),
            Metric::NegEuclidean => -Self::squared_distance(a, b).sqrt(),
        }
    }

    /// Raw dot product over the common prefix.
    #[cfg(feature = "simd")]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        use simsimd::SpatialSimilarity;
        let n = a.len().min(b.len());
        f32::dot(&a[..n], &b[..n]).unwrap_or(0.0) as f32
    }

    #[cfg(not(feature = "simd"))]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
    }

    /// L2 norm.
    pub fn norm(v: &[f32]) -> f32 {
        v.iter().map(|&x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity: dot(a, b) / (||a|| * ||b||)
    ///
    /// Returns a value in [-1, 1], or 0 when either side is (near) zero.
    pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len().min(b.len());
        let (a, b) = (&a[..n], &b[..n]);
        let norm_a = Self::norm(a);
        let norm_b = Self::norm(b);

        if norm_a < 1e-10 || norm_b < 1e-10 {
            return 0.0;
        }

        Self::dot(a, b) / (norm_a * norm_b)
    }

    /// Squared Euclidean distance over the common prefix.
    pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let diff = x - y;
                diff * diff
            })
            .sum()
    }

    /// Return a unit-normalized copy of `v` (all zeros stays all zeros).
    pub fn normalized(v: &[f32]) -> Vec<f32> {
        let norm = Self::norm(v);
        if norm < 1e-10 {
            return vec![0.0; v.len()];
        }
        v.iter().map(|&x| x / norm).collect()
    }

    /// Numerically stable softmax: the maximum score is subtracted before
    /// exponentiating. An empty slice yields an empty vector.
    pub fn softmax(scores: &[f32]) -> Vec<f32> {
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return vec![0.0; scores.len()];
        }

        let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Row-major matrix-vector product `y = W x` where `W` has `rows` rows
    /// of `x.len()` columns.
    pub fn matvec(weights: &[f32], x: &[f32], rows: usize) -> Vec<f32> {
        let cols = x.len();
        (0..rows)
            .map(|j| Self::dot(&weights[j * cols..(j + 1) * cols], x))
            .collect()
    }
}
