//! Moore-Penrose 伪逆.
//!
//! 由分治 SVD (`?gesdd`) 的经济分解计算: `A = U·Σ·Vᵀ`, `A⁺ = V·Σ⁺·Uᵀ`.
//! 经济分解只保留 `min(m, n)` 个奇异向量, 因此光流矩阵 (样本数远小于体素数)
//! 的伪逆在时间上只与样本数的平方乘体素数成正比.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_linalg::{JobSvd, SVDDC};

use crate::error::{FlexError, FlexResult};

/// 伪逆的数值质量报告.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinvReport {
    /// 保留的奇异值个数 (数值秩).
    pub rank: usize,

    /// 被截断的奇异值个数.
    pub discarded: usize,

    /// 最大奇异值.
    pub sigma_max: f64,

    /// 条件数 `σ_max / σ_min`, 仅统计保留的奇异值. 秩为 0 时为无穷大.
    pub condition: f64,
}

impl PinvReport {
    /// 条件数超过 `threshold` 或存在截断时认为矩阵病态.
    #[inline]
    pub fn is_ill_conditioned(&self, threshold: f64) -> bool {
        self.discarded > 0 || !(self.condition <= threshold)
    }

    /// 记录日志. 病态时给出警告.
    pub fn log(&self, threshold: f64) {
        if self.discarded > 0 {
            log::warn!(
                "pseudo-inverse discarded {} of {} singular values (rank {})",
                self.discarded,
                self.rank + self.discarded,
                self.rank
            );
        }
        if !(self.condition <= threshold) {
            log::warn!(
                "pseudo-inverse is ill-conditioned: condition number {:.3e} > {:.3e}",
                self.condition,
                threshold
            );
        }
        if !self.is_ill_conditioned(threshold) {
            log::info!(
                "pseudo-inverse: rank {}, condition number {:.3e}",
                self.rank,
                self.condition
            );
        }
    }
}

/// 伪逆及其数值质量报告.
#[derive(Debug, Clone)]
pub struct Pinv {
    /// 伪逆矩阵, 形状为输入的转置.
    pub matrix: Array2<f64>,

    /// 数值质量报告.
    pub report: PinvReport,
}

/// 计算 `a` (`[m, n]`) 的伪逆 (`[n, m]`).
///
/// 奇异值 `σ <= rcond * σ_max` 视为零. 病态矩阵不会导致失败,
/// 其数值质量由 [`PinvReport`] 给出, 由调用方决定如何处理.
pub fn pseudo_inverse(a: ArrayView2<f64>, rcond: f64) -> FlexResult<Pinv> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err(FlexError::InvalidInput(format!(
            "cannot invert an empty {m}x{n} matrix"
        )));
    }
    if !(rcond >= 0.0) {
        return Err(FlexError::InvalidInput(format!("rcond must be >= 0, got {rcond}")));
    }

    let (u, sigma, vt) = a.svddc(JobSvd::Some)?;
    let (u, vt) = match (u, vt) {
        (Some(u), Some(vt)) => (u, vt),
        _ => {
            return Err(FlexError::InvalidInput(
                "SVD did not return singular vectors".to_string(),
            ))
        }
    };

    // gesdd 按降序返回奇异值, 这里不依赖该顺序.
    let sigma_max = sigma.iter().copied().fold(0.0, f64::max);
    let cutoff = rcond * sigma_max;
    let keep: Vec<usize> = (0..sigma.len())
        .filter(|&i| sigma_max > 0.0 && sigma[i] > cutoff)
        .collect();
    let sigma_min = keep.iter().map(|&i| sigma[i]).fold(f64::INFINITY, f64::min);

    // V_k · diag(1 / σ_k) · U_kᵀ.
    let matrix = if keep.is_empty() {
        Array2::zeros((n, m))
    } else {
        let v = vt.select(Axis(0), &keep).reversed_axes();
        let u = u.select(Axis(1), &keep);
        let inv_s = Array1::from_iter(keep.iter().map(|&i| 1.0 / sigma[i]));
        let scaled = &v * &inv_s.view().insert_axis(Axis(0));
        scaled.dot(&u.t())
    };

    let report = PinvReport {
        rank: keep.len(),
        discarded: sigma.len() - keep.len(),
        sigma_max,
        condition: if keep.is_empty() {
            f64::INFINITY
        } else {
            sigma_max / sigma_min
        },
    };
    Ok(Pinv { matrix, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DEFAULT_RCOND;
    use ndarray::{array, Array2};

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        assert_eq!(a.dim(), b.dim());
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    #[test]
    fn test_square_invertible() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, -1.0], [0.5, -1.0, 2.0]];
        let p = pseudo_inverse(a.view(), 1e-10).unwrap();
        let eye = Array2::<f64>::eye(3);
        assert!(max_abs_diff(&a.dot(&p.matrix), &eye) < 1e-9);
        assert_eq!(p.report.rank, 3);
        assert_eq!(p.report.discarded, 0);
        assert!(p.report.condition.is_finite());
    }

    #[test]
    fn test_wide_and_tall_penrose_conditions() {
        let wide = array![[1.0, 2.0, 0.0, -1.0, 3.0], [0.0, 1.0, 1.0, 2.0, -2.0]];
        for a in [wide.clone(), wide.t().to_owned()] {
            let p = pseudo_inverse(a.view(), 1e-10).unwrap().matrix;
            assert_eq!(p.dim(), (a.ncols(), a.nrows()));
            // A A⁺ A = A, A⁺ A A⁺ = A⁺.
            assert!(max_abs_diff(&a.dot(&p).dot(&a), &a) < 1e-9);
            assert!(max_abs_diff(&p.dot(&a).dot(&p), &p) < 1e-9);
        }
    }

    #[test]
    fn test_rank_deficient_is_reported_not_fatal() {
        // 第二行是第一行的两倍.
        let a = array![[1.0, 2.0, 3.0, 4.0], [2.0, 4.0, 6.0, 8.0]];
        let p = pseudo_inverse(a.view(), 1e-8).unwrap();
        assert_eq!(p.report.rank, 1);
        assert_eq!(p.report.discarded, 1);
        assert!(p.report.is_ill_conditioned(1e6));
        assert!(max_abs_diff(&a.dot(&p.matrix).dot(&a), &a) < 1e-9);
    }

    /// 频率互不相同的正弦行, 线性无关.
    fn sine_rows(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(i, j)| (0.1 * (i + 1) as f64 * j as f64).sin())
    }

    /// Householder 反射 `I - 2vvᵀ / vᵀv`, 正交.
    fn reflector(v: &[f64]) -> Array2<f64> {
        let v = Array1::from(v.to_vec());
        let outer = v.view().insert_axis(Axis(1)).dot(&v.view().insert_axis(Axis(0)));
        Array2::<f64>::eye(v.len()) - outer * (2.0 / v.dot(&v))
    }

    #[test]
    fn test_duplicated_samples_exact_rank() {
        // 20 个样本中后 10 个是前 10 个的重复 (或倍数).
        let base = sine_rows(10, 600);
        let mut a = Array2::<f64>::zeros((20, 600));
        for i in 0..10 {
            a.row_mut(i).assign(&base.row(i));
            let k = if i % 2 == 0 { 1.0 } else { -2.0 };
            a.row_mut(i + 10).assign(&(&base.row(i) * k));
        }

        let p = pseudo_inverse(a.view(), DEFAULT_RCOND).unwrap();
        assert_eq!(p.report.rank, 10);
        assert_eq!(p.report.discarded, 10);
        assert!(max_abs_diff(&a.dot(&p.matrix).dot(&a), &a) < 1e-9);
        assert!(max_abs_diff(&p.matrix.dot(&a).dot(&p.matrix), &p.matrix) < 1e-9);
    }

    #[test]
    fn test_condition_1e6_round_trip() {
        let s = [1.0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6];
        let q1 = reflector(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let q2 = reflector(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 0.5]);
        let a = q1.dot(&Array2::from_diag(&Array1::from(s.to_vec()))).dot(&q2);

        let p = pseudo_inverse(a.view(), DEFAULT_RCOND).unwrap();
        assert_eq!(p.report.rank, 7);
        assert!((p.report.condition / 1e6 - 1.0).abs() < 1e-6);
        assert!(max_abs_diff(&a.dot(&p.matrix), &Array2::eye(7)) < 1e-6);
        assert!(p.report.is_ill_conditioned(1e5));
        assert!(!p.report.is_ill_conditioned(1e7));
    }

    #[test]
    fn test_zero_matrix() {
        let a = Array2::<f64>::zeros((2, 3));
        let p = pseudo_inverse(a.view(), 1e-8).unwrap();
        assert_eq!(p.report.rank, 0);
        assert!(p.matrix.iter().all(|v| *v == 0.0));
        assert!(p.report.condition.is_infinite());
    }

    #[test]
    fn test_invalid_arguments() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(pseudo_inverse(empty.view(), 1e-8).is_err());
        let a = Array2::<f64>::eye(2);
        assert!(pseudo_inverse(a.view(), f64::NAN).is_err());
    }
}
