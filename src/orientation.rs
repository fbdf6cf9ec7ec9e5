//! Sign resolution for principal-component signals.
//!
//! A principal component is only defined up to sign. The rule used here is a
//! heuristic: the signal is flipped when it anti-correlates with the mean
//! marker expression of each sample. It is usually right for coherent marker
//! panels and can be wrong for panels whose genes disagree, so callers should
//! treat the orientation as best-effort.

use float_cmp::approx_eq;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Correlation magnitude below which orientation is considered undetermined.
const ZERO_CORRELATION_EPS: f64 = 1e-12;

/// Signal after sign resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedSignal {
    pub signal: Array1<f64>,
    /// Pearson correlation of the raw signal with mean marker expression
    /// (0.0 when either vector is constant).
    pub correlation: f64,
    pub flipped: bool,
    /// The correlation was zero, so the sign was left as computed.
    pub low_confidence: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OrientationCorrector;

impl OrientationCorrector {
    /// Orients `raw_signal` against `submatrix` (genes × samples, uncentered).
    pub fn orient(&self, raw_signal: &Array1<f64>, submatrix: &Array2<f64>) -> OrientedSignal {
        let proxy = submatrix
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(raw_signal.len()));
        let correlation = pearson_correlation(raw_signal.view(), proxy.view()).unwrap_or(0.0);

        if approx_eq!(f64, correlation, 0.0, epsilon = ZERO_CORRELATION_EPS) {
            return OrientedSignal {
                signal: raw_signal.clone(),
                correlation,
                flipped: false,
                low_confidence: true,
            };
        }
        if correlation < 0.0 {
            OrientedSignal {
                signal: raw_signal.mapv(|v| -v),
                correlation,
                flipped: true,
                low_confidence: false,
            }
        } else {
            OrientedSignal {
                signal: raw_signal.clone(),
                correlation,
                flipped: false,
                low_confidence: false,
            }
        }
    }
}

/// Pearson correlation of two equal-length vectors.
///
/// Returns `None` for mismatched lengths or fewer than 2 values, and
/// `Some(0.0)` when either vector is constant.
pub fn pearson_correlation(vec_a: ArrayView1<f64>, vec_b: ArrayView1<f64>) -> Option<f64> {
    let n = vec_a.len();
    if n != vec_b.len() || n < 2 {
        return None;
    }

    let mean_a = vec_a.mean()?;
    let mean_b = vec_b.mean()?;

    let mut cov_ab = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (a, b) in vec_a.iter().zip(vec_b.iter()) {
        let diff_a = a - mean_a;
        let diff_b = b - mean_b;
        cov_ab += diff_a * diff_b;
        var_a += diff_a * diff_a;
        var_b += diff_b * diff_b;
    }

    if var_a < 1e-24 || var_b < 1e-24 {
        return Some(0.0);
    }
    let r = cov_ab / (var_a.sqrt() * var_b.sqrt());
    Some(r.clamp(-1.0, 1.0))
}
