// Principal component analysis (PCA) on centered, unscaled data

use crate::error::DecompositionError;
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Gram-path eigenvalues at or below this fraction of the largest one get a zero axis.
const GRAM_EIGENVALUE_RTOL: f64 = 1e-12;

/// Principal component analysis structure.
///
/// Holds the mean, rotation matrix and per-component variances of a fit.
/// Data are centered per feature but never scaled: features keep their raw
/// magnitudes, so high-expression markers weigh more in the leading
/// component than low-expression ones.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PCA {
    /// The rotation matrix (principal axes as unit-length columns).
    /// Shape: (n_features, k_components)
    rotation: Option<Array2<f64>>,
    /// Mean vector of the training data.
    /// Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Variance along each principal axis (eigenvalues of the covariance
    /// matrix), ordered from largest to smallest, clamped to be non-negative.
    /// Shape: (k_components)
    explained_variance: Option<Array1<f64>>,
    /// Total variance of the centered training data (trace of the covariance).
    total_variance: Option<f64>,
}

impl PCA {
    /// Creates a new, unfitted PCA struct.
    ///
    /// # Examples
    ///
    /// ```
    /// use marker_decon::pca::PCA;
    /// let pca = PCA::new();
    /// assert!(pca.rotation().is_none());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean vector of the training data, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Rotation matrix (n_features, k_components), if fitted.
    pub fn rotation(&self) -> Option<&Array2<f64>> {
        self.rotation.as_ref()
    }

    /// Variance along each principal axis, largest first, if fitted.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Total variance of the centered training data, if fitted.
    pub fn total_variance(&self) -> Option<f64> {
        self.total_variance
    }

    /// Fraction of the total variance captured by the first
    /// `n_components` axes (or all axes, if fewer exist), clamped to [0, 1].
    ///
    /// Returns `None` if the model is unfitted or the total variance is zero.
    pub fn explained_variance_ratio(&self, n_components: usize) -> Option<f64> {
        let variances = self.explained_variance.as_ref()?;
        let total = self.total_variance?;
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        let k = n_components.min(variances.len());
        let captured: f64 = variances.slice(s![..k]).sum();
        Some((captured / total).clamp(0.0, 1.0))
    }

    /// Fits the model using an exact covariance/Gram matrix approach.
    ///
    /// Principal axes come from an eigendecomposition of the covariance
    /// matrix (if n_features <= n_samples) or of the Gram matrix (if
    /// n_features > n_samples, the "Gram trick"). All components up to the
    /// size of the decomposed matrix are kept; axes with a vanishing
    /// eigenvalue are stored as zero vectors.
    ///
    /// * `data_matrix` - Input data, shape (n_samples, n_features).
    ///
    /// # Errors
    /// `DecompositionError::InvalidInput` if the matrix has a zero dimension,
    /// fewer than 2 samples or non-finite values;
    /// `DecompositionError::Linalg` if the eigendecomposition fails.
    pub fn fit(&mut self, mut data_matrix: Array2<f64>) -> Result<(), DecompositionError> {
        let n_samples = data_matrix.nrows();
        let n_features = data_matrix.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(DecompositionError::InvalidInput(
                "PCA input has zero samples or zero features.".to_string(),
            ));
        }
        if n_samples < 2 {
            return Err(DecompositionError::InvalidInput(
                "PCA input must have at least 2 samples.".to_string(),
            ));
        }
        if data_matrix.iter().any(|v| !v.is_finite()) {
            return Err(DecompositionError::InvalidInput(
                "PCA input contains non-finite values.".to_string(),
            ));
        }

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| DecompositionError::InvalidInput("Failed to compute mean of the data.".to_string()))?;
        data_matrix -= &mean_vector;
        let centered = data_matrix;
        let denom = (n_samples - 1) as f64;
        let total_variance = centered.iter().map(|v| v * v).sum::<f64>() / denom;

        let backend = LinAlgBackendProvider::<f64>::new();

        let (rotation_matrix, sorted_eigenvalues) = if n_features <= n_samples {
            let mut cov_matrix = centered.t().dot(&centered);
            cov_matrix /= denom;

            let eig = backend.eigh_upper(&cov_matrix).map_err(|e| {
                DecompositionError::Linalg(format!("Eigen decomposition of covariance matrix failed: {}", e))
            })?;
            let eig_pairs = sorted_eig_pairs(eig.eigenvalues, eig.eigenvectors);

            let mut rotation_matrix = Array2::<f64>::zeros((n_features, eig_pairs.len()));
            let mut sorted_eigenvalues = Vec::with_capacity(eig_pairs.len());
            for (i, (eig_val, eig_vec)) in eig_pairs.into_iter().enumerate() {
                sorted_eigenvalues.push(eig_val.max(0.0));
                rotation_matrix.column_mut(i).assign(&unit_or_zero(eig_vec));
            }
            (rotation_matrix, sorted_eigenvalues)
        } else {
            // Gram trick path
            let mut gram_matrix = centered.dot(&centered.t());
            gram_matrix /= denom;

            let eig = backend.eigh_upper(&gram_matrix).map_err(|e| {
                DecompositionError::Linalg(format!("Eigen decomposition of Gram matrix failed: {}", e))
            })?;
            let eig_pairs = sorted_eig_pairs(eig.eigenvalues, eig.eigenvectors);
            // Relative to the leading eigenvalue so that small-magnitude data keeps its axes.
            let largest = eig_pairs.first().map_or(0.0, |(val, _)| val.max(0.0));
            let tolerance = if largest.is_finite() { largest * GRAM_EIGENVALUE_RTOL } else { 0.0 };

            let mut rotation_matrix = Array2::<f64>::zeros((n_features, eig_pairs.len()));
            let mut sorted_eigenvalues = Vec::with_capacity(eig_pairs.len());
            for (i, (eig_val, u_col)) in eig_pairs.into_iter().enumerate() {
                let eig_val = eig_val.max(0.0);
                sorted_eigenvalues.push(eig_val);
                if eig_val <= tolerance {
                    continue;
                }
                // V_k = X^T u_k / sqrt(lambda_k (N-1)); re-normalized below.
                let mut axis_i = centered.t().dot(&u_col);
                axis_i /= (eig_val * denom).sqrt();
                rotation_matrix.column_mut(i).assign(&unit_or_zero(axis_i));
            }
            (rotation_matrix, sorted_eigenvalues)
        };

        self.mean = Some(mean_vector);
        self.rotation = Some(rotation_matrix);
        self.explained_variance = Some(Array1::from(sorted_eigenvalues));
        self.total_variance = Some(total_variance);
        Ok(())
    }

    /// Centers `x` with the training mean and projects it onto the
    /// principal axes.
    ///
    /// * `x` - Data of shape (m_samples, n_features); modified in place.
    ///
    /// # Errors
    /// `DecompositionError::InvalidInput` if the model is unfitted or the
    /// feature dimension does not match.
    pub fn transform(&self, mut x: Array2<f64>) -> Result<Array2<f64>, DecompositionError> {
        let rotation_matrix = self.rotation.as_ref().ok_or_else(|| {
            DecompositionError::InvalidInput("PCA model: Rotation matrix not set. Fit the model first.".to_string())
        })?;
        let mean_vector = self.mean.as_ref().ok_or_else(|| {
            DecompositionError::InvalidInput("PCA model: Mean vector not set. Fit the model first.".to_string())
        })?;

        if x.ncols() != mean_vector.len() {
            return Err(DecompositionError::InvalidInput(format!(
                "Input data feature dimension ({}) does not match model's feature dimension ({}).",
                x.ncols(),
                mean_vector.len()
            )));
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, rotation_matrix.ncols())));
        }

        x -= mean_vector;
        Ok(x.dot(rotation_matrix))
    }

    /// Fits the model and returns the training scores, shape
    /// (n_samples, k_components).
    pub fn fit_transform(&mut self, data_matrix: Array2<f64>) -> Result<Array2<f64>, DecompositionError> {
        self.fit(data_matrix.clone())?;
        self.transform(data_matrix)
    }
}

/// Pairs eigenvalues with their eigenvectors, largest eigenvalue first.
fn sorted_eig_pairs(eigenvalues: Array1<f64>, eigenvectors: Array2<f64>) -> Vec<(f64, Array1<f64>)> {
    let mut eig_pairs: Vec<(f64, Array1<f64>)> = eigenvalues
        .into_iter()
        .zip(eigenvectors.columns().into_iter().map(|col| col.to_owned()))
        .collect();
    eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    eig_pairs
}

fn unit_or_zero(mut v: Array1<f64>) -> Array1<f64> {
    let norm = l2_norm(v.view());
    if norm > 1e-9 {
        v.mapv_inplace(|x| x / norm);
    } else {
        v.fill(0.0);
    }
    v
}

fn l2_norm(v: ArrayView1<f64>) -> f64 {
    v.dot(&v).sqrt()
}
