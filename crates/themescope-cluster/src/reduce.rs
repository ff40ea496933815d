//! PCA projection by power iteration with deflation.
//!
//! Eigenvectors are computed on whichever of the covariance (`d × d`) or
//! Gram (`n × n`) matrix is smaller. Start vectors come from a seeded
//! `StdRng` and each component's sign is fixed, so the projection is
//! deterministic for a given seed.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_ITERATIONS: usize = 300;
const TOLERANCE: f64 = 1e-10;

/// Project `rows` onto their top `k` principal components.
///
/// Returns the input unchanged (as `Vec<Vec<f32>>`) when there is nothing to
/// reduce.
pub fn pca_project(rows: &[Array1<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
    let n = rows.len();
    let d = rows.first().map_or(0, |r| r.len());
    if n < 2 || d == 0 || k == 0 || k >= d {
        return rows.iter().map(|r| r.to_vec()).collect();
    }

    let mut x = Array2::<f64>::zeros((n, d));
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row.iter().enumerate().take(d) {
            x[[i, j]] = f64::from(*v);
        }
    }
    if let Some(mean) = x.mean_axis(Axis(0)) {
        x -= &mean;
    }

    let k = k.min(n.min(d));
    let mut rng = StdRng::seed_from_u64(seed);
    let components: Vec<Array1<f64>> = if d <= n {
        let cov = x.t().dot(&x);
        top_eigenvectors(cov, k, &mut rng)
    } else {
        // v = Xᵀu / |Xᵀu| for eigenvectors u of the Gram matrix.
        let gram = x.dot(&x.t());
        top_eigenvectors(gram, k, &mut rng)
            .into_iter()
            .map(|u| {
                let mut v = x.t().dot(&u);
                normalize(&mut v);
                v
            })
            .collect()
    };

    (0..n)
        .map(|i| {
            let row = x.row(i);
            components
                .iter()
                .map(|c| row.dot(c) as f32)
                .collect::<Vec<f32>>()
        })
        .collect()
}

fn top_eigenvectors(mut m: Array2<f64>, k: usize, rng: &mut StdRng) -> Vec<Array1<f64>> {
    let size = m.nrows();
    let mut vectors = Vec::with_capacity(k);
    for _ in 0..k {
        let mut v: Array1<f64> = (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect();
        normalize(&mut v);

        for _ in 0..MAX_ITERATIONS {
            let mut next = m.dot(&v);
            if normalize(&mut next) <= TOLERANCE {
                break;
            }
            let delta = (&next - &v).mapv(f64::abs).sum();
            v = next;
            if delta < TOLERANCE {
                break;
            }
        }
        fix_sign(&mut v);

        let lambda = v.dot(&m.dot(&v));
        if lambda <= TOLERANCE {
            // Remaining variance is zero; pad with deterministic zero axes.
            vectors.push(Array1::zeros(size));
            continue;
        }
        let deflation = outer(&v, &v) * lambda;
        m -= &deflation;
        vectors.push(v);
    }
    vectors
}

fn normalize(v: &mut Array1<f64>) -> f64 {
    let norm = v.dot(v).sqrt();
    if norm > TOLERANCE {
        v.mapv_inplace(|x| x / norm);
    }
    norm
}

/// Largest-magnitude entry positive.
fn fix_sign(v: &mut Array1<f64>) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let col = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    col.dot(&row)
}
