//! 由轨迹点重建原始形变向量.
//!
//! 有逆映射时是降维的精确逆 ([`ReconstructionMode::Exact`]); 否则对每个轨迹点取
//! 降维空间中最近的样本, 输出其原始形变向量 ([`ReconstructionMode::Estimated`]).

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::dataset::{textmat, RunPaths};
use crate::error::{FlexError, FlexResult};

mod projector;

pub use projector::{InverseTransform, LinearProjector, PcaModel, Projector, SKLEARN_PCA};

/// 重建方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReconstructionMode {
    /// 降维的精确逆映射.
    Exact,

    /// 最近邻估计.
    Estimated,
}

impl fmt::Display for ReconstructionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact inverse of the dimensionality reduction"),
            Self::Estimated => write!(f, "nearest-sample estimate"),
        }
    }
}

/// 重建结果.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// `[T, D]` 形变向量, 行顺序与输入一致.
    pub deformations: Array2<f64>,

    /// 重建方式.
    pub mode: ReconstructionMode,
}

/// 最近邻回退所需的样本表: 降维坐标及对应的原始形变向量.
#[derive(Debug, Clone)]
pub struct SampleTable {
    embedding: Array2<f64>,
    deformations: Array2<f64>,
}

impl SampleTable {
    /// 两个矩阵的行数必须一致.
    pub fn new(embedding: Array2<f64>, deformations: Array2<f64>) -> FlexResult<Self> {
        if embedding.nrows() != deformations.nrows() {
            return Err(FlexError::shape(
                "deformation rows vs embedding rows",
                embedding.nrows(),
                deformations.nrows(),
            ));
        }
        Ok(Self {
            embedding,
            deformations,
        })
    }

    /// 读取运行目录下的降维结果和原始形变向量.
    pub fn load(paths: &RunPaths) -> FlexResult<Self> {
        Self::new(
            textmat::read_matrix(paths.output_matrix())?,
            textmat::read_matrix(paths.deformations())?,
        )
    }

    /// 降维坐标.
    #[inline]
    pub fn embedding(&self) -> ArrayView2<'_, f64> {
        self.embedding.view()
    }

    /// 原始形变向量.
    #[inline]
    pub fn deformations(&self) -> ArrayView2<'_, f64> {
        self.deformations.view()
    }
}

/// 在 `embedding` 的行中寻找与 `p` 平方距离最小的一行.
///
/// 距离相同时取最先出现的一行. 返回 `(行号, 与之距离相同的其它行数)`.
pub fn nearest_sample(embedding: ArrayView2<f64>, p: ArrayView1<f64>) -> (usize, usize) {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    let mut ties = 0;
    for (i, row) in embedding.axis_iter(Axis(0)).enumerate() {
        let d: f64 = row.iter().zip(p.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
        if d < best_d {
            best = i;
            best_d = d;
            ties = 0;
        } else if d == best_d {
            ties += 1;
        }
    }
    (best, ties)
}

/// 由 `[T, d]` 轨迹点重建 `[T, D]` 形变向量.
///
/// `samples` 仅在 [`Projector::NoProjector`] 时使用, 此时必须提供.
pub fn reconstruct_deformations(
    points: ArrayView2<f64>,
    projector: &Projector,
    samples: Option<&SampleTable>,
) -> FlexResult<Reconstruction> {
    if points.nrows() == 0 {
        return Err(FlexError::InvalidInput("empty trajectory".to_string()));
    }

    let (deformations, mode) = match projector {
        Projector::Linear(lp) => (lp.apply(points)?, ReconstructionMode::Exact),
        Projector::Fitted(model) => (model.inverse_transform(points)?, ReconstructionMode::Exact),
        Projector::NoProjector => {
            let samples = samples.ok_or_else(|| {
                FlexError::InvalidInput("nearest-sample fallback needs a sample table".to_string())
            })?;
            (nearest_deformations(points, samples)?, ReconstructionMode::Estimated)
        }
    };

    log::info!("animation is the {mode}");
    Ok(Reconstruction { deformations, mode })
}

fn nearest_deformations(points: ArrayView2<f64>, samples: &SampleTable) -> FlexResult<Array2<f64>> {
    let y = samples.embedding();
    if points.ncols() != y.ncols() {
        return Err(FlexError::shape(
            "trajectory point dimension",
            y.ncols(),
            points.ncols(),
        ));
    }

    let x = samples.deformations();
    let mut out = Array2::zeros((points.nrows(), x.ncols()));
    let mut tied_points = 0;
    for (t, (p, mut row)) in points.rows().into_iter().zip(out.rows_mut()).enumerate() {
        let (i, ties) = nearest_sample(y, p);
        if ties > 0 {
            tied_points += 1;
            log::debug!("trajectory point {t}: {ties} samples tie with sample {}", i + 1);
        }
        row.assign(&x.row(i));
    }
    if tied_points > 0 {
        log::warn!(
            "{tied_points} trajectory point(s) are equidistant to several samples; \
             the first sample was used"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        assert_eq!(a.dim(), b.dim());
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    #[test]
    fn test_linear_round_trip() {
        let m = array![[2.0, 0.5, 0.0], [0.0, 1.5, -0.3], [0.4, 0.0, 1.0]];
        let x = array![[1.0, -2.0, 0.5], [0.0, 3.0, 4.0], [-1.5, 0.25, 2.0]];
        let p = x.dot(&m);

        let projector = Projector::Linear(LinearProjector::new(m, 1e-10, 1e6).unwrap());
        let r = reconstruct_deformations(p.view(), &projector, None).unwrap();
        assert_eq!(r.mode, ReconstructionMode::Exact);
        assert!(max_abs_diff(&r.deformations, &x) < 1e-6);
    }

    #[test]
    fn test_linear_projector_reduced_dim_from_pinv() {
        // M: [D = 4, d = 2].
        let m = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, -1.0]];
        let projector = LinearProjector::new(m, 1e-10, 1e6).unwrap();
        assert_eq!(projector.reduced_dim(), 2);
        assert!(projector.apply(array![[1.0, 2.0, 3.0]].view()).is_err());
        assert_eq!(projector.apply(array![[0.0, 0.0]].view()).unwrap().dim(), (1, 4));
    }

    #[test]
    fn test_fitted_projector() {
        let model = PcaModel::new(array![1.0, 1.0], array![[1.0, -1.0]]).unwrap();
        let projector = Projector::Fitted(Box::new(model));
        let r = reconstruct_deformations(array![[2.0], [0.0]].view(), &projector, None).unwrap();
        assert_eq!(r.deformations, array![[3.0, -1.0], [1.0, 1.0]]);
        assert_eq!(r.mode, ReconstructionMode::Exact);
    }

    #[test]
    fn test_nearest_sample_first_tie_wins() {
        let y = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [5.0, 5.0]];
        assert_eq!(nearest_sample(y.view(), array![0.0, 0.0].view()), (0, 2));
        assert_eq!(nearest_sample(y.view(), array![4.0, 4.0].view()), (3, 0));
        assert_eq!(nearest_sample(y.view(), array![-0.9, 0.1].view()), (2, 0));
    }

    #[test]
    fn test_estimated_end_to_end() {
        let y = array![[0.0, 0.0], [0.9, 1.1], [2.1, 1.9], [3.0, 3.0], [4.0, 4.0]];
        let x = array![[10.0, 0.0], [20.0, 1.0], [30.0, 2.0], [40.0, 3.0], [50.0, 4.0]];
        let table = SampleTable::new(y, x).unwrap();

        let points = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let r = reconstruct_deformations(points.view(), &Projector::NoProjector, Some(&table)).unwrap();
        assert_eq!(r.mode, ReconstructionMode::Estimated);
        assert_eq!(r.deformations, array![[10.0, 0.0], [20.0, 1.0], [30.0, 2.0]]);
    }

    #[test]
    fn test_errors() {
        let table = SampleTable::new(array![[0.0, 0.0]], array![[1.0]]).unwrap();
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            reconstruct_deformations(empty.view(), &Projector::NoProjector, Some(&table)),
            Err(FlexError::InvalidInput(_))
        ));
        assert!(matches!(
            reconstruct_deformations(array![[0.0, 0.0, 0.0]].view(), &Projector::NoProjector, Some(&table)),
            Err(FlexError::ShapeMismatch { .. })
        ));
        assert!(reconstruct_deformations(array![[0.0, 0.0]].view(), &Projector::NoProjector, None).is_err());
        assert!(SampleTable::new(array![[0.0], [1.0]], array![[1.0]]).is_err());
    }
}
