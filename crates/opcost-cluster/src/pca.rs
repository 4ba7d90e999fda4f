//! Principal component analysis on dense rows.
//!
//! The covariance matrix of an opcode alphabet is small (68 x 68 by
//! default), so the fit diagonalizes it directly with cyclic Jacobi
//! rotations rather than running an SVD over the data matrix. Jacobi is
//! unconditionally stable for symmetric matrices and needs no random
//! starting vector, which keeps the projection fully deterministic.

/// Parameters controlling the eigendecomposition.
#[derive(Debug, Clone, Copy)]
pub struct PcaParams {
    /// Number of principal components to keep.
    pub components: usize,
    /// Maximum number of full Jacobi sweeps.
    pub max_sweeps: usize,
    /// Stop once the off-diagonal mass falls below this fraction of the
    /// total squared mass of the covariance matrix.
    pub tolerance: f64,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            components: 2,
            max_sweeps: 100,
            tolerance: 1e-22,
        }
    }
}

/// Result of a PCA fit.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaFit {
    /// Column means of the input.
    pub mean: Vec<f64>,
    /// Unit-length principal axes, strongest first.
    pub components: Vec<Vec<f64>>,
    /// Sample variance along each kept axis.
    pub explained_variance: Vec<f64>,
    /// Sum of the sample variance over all input dimensions.
    pub total_variance: f64,
    /// Jacobi sweeps performed.
    pub sweeps: usize,
}

impl PcaFit {
    /// Fraction of the total variance captured by the kept axes.
    pub fn explained_variance_ratio(&self) -> f64 {
        if self.total_variance <= 0.0 {
            return 0.0;
        }
        self.explained_variance.iter().sum::<f64>() / self.total_variance
    }
}

/// Fits principal components to `data` (one row per sample).
///
/// Each axis is sign-normalized so that its largest-magnitude loading is
/// positive; without that the sign of an eigenvector is arbitrary.
///
/// Returns `None` if `data` is empty, rows differ in length, or more
/// components are requested than the data has dimensions.
#[must_use]
pub fn fit_pca(data: &[Vec<f64>], params: &PcaParams) -> Option<PcaFit> {
    let dim = data.first()?.len();
    if dim == 0
        || params.components == 0
        || params.components > dim
        || data.iter().any(|row| row.len() != dim)
    {
        return None;
    }

    let mean = column_means(data, dim);
    let covariance = covariance(data, &mean);
    let total_variance: f64 = (0..dim).map(|i| covariance[i][i]).sum();

    let (eigenvalues, eigenvectors, sweeps) =
        jacobi_eigen(covariance, params.max_sweeps, params.tolerance);

    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let mut components = Vec::with_capacity(params.components);
    let mut explained_variance = Vec::with_capacity(params.components);
    for &col in order.iter().take(params.components) {
        let mut axis: Vec<f64> =
            eigenvectors.iter().map(|row| row[col]).collect();
        normalize_sign(&mut axis);
        components.push(axis);
        explained_variance.push(eigenvalues[col].max(0.0));
    }

    Some(PcaFit {
        mean,
        components,
        explained_variance,
        total_variance,
        sweeps,
    })
}

#[expect(
    clippy::cast_precision_loss,
    reason = "sample counts stay far below 2^53"
)]
fn column_means(data: &[Vec<f64>], dim: usize) -> Vec<f64> {
    let mut mean = vec![0.0; dim];
    for row in data {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    let n = data.len() as f64;
    for m in &mut mean {
        *m /= n;
    }
    mean
}

/// Sample covariance with the `n - 1` denominator (`n` for a single row).
#[expect(
    clippy::cast_precision_loss,
    reason = "sample counts stay far below 2^53"
)]
fn covariance(data: &[Vec<f64>], mean: &[f64]) -> Vec<Vec<f64>> {
    let dim = mean.len();
    let mut cov = vec![vec![0.0; dim]; dim];
    let mut centered = vec![0.0; dim];
    for row in data {
        for ((c, x), m) in centered.iter_mut().zip(row).zip(mean) {
            *c = x - m;
        }
        for i in 0..dim {
            if centered[i] == 0.0 {
                continue;
            }
            for j in i..dim {
                cov[i][j] += centered[i] * centered[j];
            }
        }
    }
    let denom = data.len().saturating_sub(1).max(1) as f64;
    for i in 0..dim {
        for j in i..dim {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Diagonalizes a symmetric matrix with cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, eigenvectors, sweeps)` where column `k` of
/// `eigenvectors` pairs with `eigenvalues[k]`.
fn jacobi_eigen(
    mut a: Vec<Vec<f64>>,
    max_sweeps: usize,
    tolerance: f64,
) -> (Vec<f64>, Vec<Vec<f64>>, usize) {
    let n = a.len();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    let total: f64 = a.iter().flatten().map(|x| x * x).sum();
    let mut sweeps = 0;
    while sweeps < max_sweeps {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off <= tolerance * total {
            break;
        }
        sweeps += 1;

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                // Rotation angle that zeroes a[p][q].
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let t = theta.signum()
                    / (theta.abs() + theta.mul_add(theta, 1.0).sqrt());
                let c = 1.0 / t.mul_add(t, 1.0).sqrt();
                let s = t * c;

                for row in &mut a {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in &mut v {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v, sweeps)
}

fn normalize_sign(axis: &mut [f64]) {
    let pivot = axis
        .iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if pivot < 0.0 {
        for x in axis.iter_mut() {
            *x = -*x;
        }
    }
}
