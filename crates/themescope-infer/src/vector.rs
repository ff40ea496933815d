//! Small dense-vector helpers.

use ndarray::Array1;

/// Scale to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut Array1<f32>) {
    let norm = v.dot(v).sqrt();
    if norm > f32::EPSILON {
        v.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity in `[-1, 1]`; 0 when either side is a zero vector or the
/// dimensions differ.
pub fn cosine(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let na = a.dot(a).sqrt();
    let nb = b.dot(b).sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    let sim = f64::from(a.dot(b)) / (f64::from(na) * f64::from(nb));
    sim.clamp(-1.0, 1.0)
}

/// Mean of the given vectors, or `None` for an empty selection.
pub fn centroid<'a, I>(vectors: I) -> Option<Array1<f32>>
where
    I: IntoIterator<Item = &'a Array1<f32>>,
{
    let mut iter = vectors.into_iter();
    let mut sum = iter.next()?.clone();
    let mut count = 1usize;
    for v in iter {
        if v.len() == sum.len() {
            sum += v;
            count += 1;
        }
    }
    sum.mapv_inplace(|x| x / count as f32);
    Some(sum)
}

/// Mean cosine similarity of `members` to `center`, floored at 0.
pub fn mean_similarity<'a, I>(members: I, center: &Array1<f32>) -> f64
where
    I: IntoIterator<Item = &'a Array1<f32>>,
{
    let (sum, n) = members
        .into_iter()
        .fold((0.0f64, 0usize), |(s, n), v| (s + cosine(v, center), n + 1));
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).max(0.0)
    }
}
