//! Principal component analysis with a fixed three-axis output.
//!
//! The eigen-decomposition runs on whichever of the Gram matrix `Xc Xc^T` or the
//! scatter matrix `Xc^T Xc` is smaller; for the tokens of a 2048-wide model that
//! is the Gram matrix. Both share their non-zero eigenvalues, and the Gram
//! eigenvectors map back to principal axes through `Xc^T u / sqrt(l)`.
//!
//! Small matrices are solved completely by cyclic Jacobi sweeps. Larger ones
//! only need the leading three eigenpairs, found by block subspace iteration
//! with a Rayleigh-Ritz step. Both use fixed pivot orders and fixed start
//! vectors, so identical input produces bit-identical output on one platform.
//! Each axis is flipped so that its largest-magnitude loading is positive.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};

use crate::ReduceError;

/// Number of principal components produced.
pub const COMPONENTS: usize = 3;

const MAX_SWEEPS: usize = 64;
const CONVERGENCE: f64 = 1e-12;
/// Matrices up to this order are decomposed completely.
const DENSE_LIMIT: usize = 64;
/// Extra block columns carried by subspace iteration beyond the wanted pairs.
const OVERSAMPLE: usize = 7;
const MAX_ITERATIONS: usize = 1000;
/// Ritz pairs are accepted once `|C v - theta v| <= RESIDUAL_TOL * theta_max`.
const RESIDUAL_TOL: f64 = 1e-9;
/// Eigenvalues below this fraction of the largest are treated as zero variance.
const RELATIVE_RANK_TOL: f64 = 1e-12;
/// Floor relative to the uncentered energy of the data; catches rows that only
/// differ by rounding noise after centering.
const ABSOLUTE_RANK_TOL: f64 = 1e-24;

/// A fitted 3-axis projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    mean: Array1<f64>,
    /// One unit-length principal axis per row, or an all-zero row for an axis
    /// without variance.
    axes: Array2<f64>,
    explained_variance: [f64; COMPONENTS],
}

impl Pca {
    /// Fits the projection to the rows of `x`.
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self, ReduceError> {
        let (n, d) = x.dim();
        if n < COMPONENTS {
            return Err(ReduceError::DegenerateInput {
                rows: n,
                required: COMPONENTS,
            });
        }

        let mean = x.mean_axis(Axis(0)).ok_or(ReduceError::DegenerateInput {
            rows: n,
            required: COMPONENTS,
        })?;
        let centered = &x - &mean;
        let energy: f64 = x.iter().map(|v| v * v).sum();

        let use_gram = n <= d;
        let cross = if use_gram {
            centered.dot(&centered.t())
        } else {
            centered.t().dot(&centered)
        };
        let (eigenvalues, eigenvectors) = leading_eigen(cross, COMPONENTS);

        let largest = eigenvalues.first().map_or(0.0, |&l| l.max(0.0));
        let tol = (largest * RELATIVE_RANK_TOL).max(energy * ABSOLUTE_RANK_TOL);

        let mut axes = Array2::<f64>::zeros((COMPONENTS, d));
        let mut explained_variance = [0.0; COMPONENTS];

        for (k, &lambda) in eigenvalues.iter().enumerate() {
            if lambda <= tol {
                continue;
            }
            let u = eigenvectors.column(k);
            let mut axis = if use_gram {
                centered.t().dot(&u) / lambda.sqrt()
            } else {
                u.to_owned()
            };
            let norm = axis.dot(&axis).sqrt();
            if norm > 0.0 {
                axis /= norm;
            }
            orient(&mut axis);
            axes.row_mut(k).assign(&axis);
            explained_variance[k] = lambda / (n - 1) as f64;
        }

        tracing::debug!(
            rows = n,
            dim = d,
            gram = use_gram,
            variance = ?explained_variance,
            "fitted principal axes"
        );

        Ok(Self {
            mean,
            axes,
            explained_variance,
        })
    }

    /// Projects the rows of `x` onto the fitted axes, preserving row order.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Vec<[f64; COMPONENTS]>, ReduceError> {
        if x.ncols() != self.mean.len() {
            return Err(ReduceError::DimensionalityMismatch {
                input: self.mean.len(),
                output: x.ncols(),
            });
        }
        let projected = (&x - &self.mean).dot(&self.axes.t());
        Ok(projected
            .rows()
            .into_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect())
    }

    pub fn fit_transform(x: ArrayView2<'_, f64>) -> Result<(Self, Vec<[f64; COMPONENTS]>), ReduceError> {
        let pca = Self::fit(x)?;
        let points = pca.transform(x)?;
        Ok((pca, points))
    }

    /// Variance of the data along each axis (`lambda / (n - 1)`).
    pub fn explained_variance(&self) -> [f64; COMPONENTS] {
        self.explained_variance
    }

    pub fn axes(&self) -> ArrayView2<'_, f64> {
        self.axes.view()
    }
}

/// Flips `axis` so its largest-magnitude entry is positive. Ties keep the first index.
fn orient(axis: &mut Array1<f64>) {
    let mut pivot = 0.0f64;
    for &v in axis.iter() {
        if v.abs() > pivot.abs() {
            pivot = v;
        }
    }
    if pivot < 0.0 {
        axis.mapv_inplace(|v| -v);
    }
}

fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));
    order
}

/// The `k` largest eigenvalues of the symmetric positive semi-definite `c`, in
/// descending order, with the matching unit eigenvectors as columns.
fn leading_eigen(c: Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
    if c.nrows() <= DENSE_LIMIT {
        let (values, vectors) = symmetric_eigen(c);
        let order: Vec<usize> = descending_order(&values).into_iter().take(k).collect();
        let values = order.iter().map(|&i| values[i]).collect();
        return (values, vectors.select(Axis(1), &order));
    }
    subspace_iteration(&c, k)
}

/// Block subspace iteration for the leading `k` eigenpairs of `c`.
///
/// Each step multiplies the block by `c`, re-orthonormalizes it and rotates it
/// onto its Ritz vectors. Cost per step is `O(m^2 * block)`.
fn subspace_iteration(c: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
    let m = c.nrows();
    let k = k.min(m);
    let block = (k + OVERSAMPLE).min(m);

    let mut q = Array2::from_shape_fn((m, block), |(i, j)| start_entry(i, j));
    orthonormalize(&mut q);

    let mut iteration = 0;
    loop {
        iteration += 1;
        let z = c.dot(&q);
        let t = q.t().dot(&z);
        let (theta, w) = symmetric_eigen((&t + &t.t()) * 0.5);
        let order = descending_order(&theta);
        let w = w.select(Axis(1), &order);
        let values: Vec<f64> = order.iter().map(|&i| theta[i]).collect();

        let ritz = q.dot(&w);
        let image = z.dot(&w);
        let scale = values[0].abs();
        let converged = (0..k).all(|j| {
            let residual = &image.column(j) - &(&ritz.column(j) * values[j]);
            residual.dot(&residual).sqrt() <= RESIDUAL_TOL * scale
        });

        if converged || iteration == MAX_ITERATIONS {
            if !converged {
                tracing::debug!(order = m, iterations = iteration, "subspace iteration stopped before convergence");
            }
            return (values[..k].to_vec(), ritz.slice(s![.., ..k]).to_owned());
        }

        q = image;
        orthonormalize(&mut q);
    }
}

/// Deterministic, well-spread start entries for subspace iteration.
fn start_entry(i: usize, j: usize) -> f64 {
    let x = ((i as f64 + 1.0) * 12.9898 + (j as f64 + 1.0) * 78.233).sin() * 43_758.545_3;
    x - x.floor() - 0.5
}

/// Modified Gram-Schmidt with one re-orthogonalization pass. A column that
/// collapses into the span of its predecessors is replaced by a fresh start
/// column, so the block always stays full rank.
fn orthonormalize(q: &mut Array2<f64>) {
    let (m, cols) = q.dim();
    for j in 0..cols {
        let mut refill = 0;
        loop {
            let before = q.column(j).dot(&q.column(j)).sqrt();
            for _ in 0..2 {
                for p in 0..j {
                    let prev = q.column(p).to_owned();
                    let proj = prev.dot(&q.column(j));
                    q.column_mut(j).scaled_add(-proj, &prev);
                }
            }
            let after = q.column(j).dot(&q.column(j)).sqrt();
            if after > 0.0 && after > 1e-10 * before {
                q.column_mut(j).mapv_inplace(|v| v / after);
                break;
            }
            refill += 1;
            if refill > m {
                q.column_mut(j).fill(0.0);
                break;
            }
            let shift = j + refill * cols;
            for i in 0..m {
                q[[i, j]] = start_entry(i, shift);
            }
        }
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// orthonormal eigenvectors, both in diagonal order (unsorted).
pub(crate) fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let m = a.nrows();
    let mut v = Array2::<f64>::eye(m);
    let frobenius = a.iter().map(|x| x * x).sum::<f64>().sqrt();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..m {
            for q in (p + 1)..m {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off.sqrt() <= CONVERGENCE * frobenius {
            break;
        }

        for p in 0..m {
            for q in (p + 1)..m {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..m {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..m {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..m {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..m).map(|i| a[[i, i]]).collect();
    (eigenvalues, v)
}
