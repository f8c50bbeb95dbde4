//! 降维映射的逆映射.

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::{textmat, RunPaths};
use crate::error::{FlexError, FlexResult};
use crate::linalg::pseudo_inverse;

/// 使用拟合模型时要求的降维方法名.
pub const SKLEARN_PCA: &str = "sklearn_PCA";

/// 把降维坐标映射回原始形变空间的拟合模型.
pub trait InverseTransform: Debug + Send + Sync {
    /// 降维维度.
    fn reduced_dim(&self) -> usize;

    /// `[T, d]` 降维点 -> `[T, D]` 形变向量.
    fn inverse_transform(&self, points: ArrayView2<f64>) -> FlexResult<Array2<f64>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PcaModelFile {
    mean: Vec<f64>,
    components: Vec<Vec<f64>>,
}

/// 拟合好的 PCA 模型. `inverse_transform(P) = P · components + mean`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaModel {
    mean: Array1<f64>,
    components: Array2<f64>,
}

impl PcaModel {
    /// `components` 形状为 `[d, D]`, `mean` 长度为 `D`.
    pub fn new(mean: Array1<f64>, components: Array2<f64>) -> FlexResult<Self> {
        if components.nrows() == 0 || components.ncols() != mean.len() {
            return Err(FlexError::shape(
                "pca components",
                format!("[d > 0, {}]", mean.len()),
                format!("{:?}", components.dim()),
            ));
        }
        Ok(Self { mean, components })
    }

    /// 读取 JSON 模型: `{"mean": [...], "components": [[...], ...]}`.
    pub fn load<P: AsRef<Path>>(path: P) -> FlexResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FlexError::io(path, e))?;
        let raw: PcaModelFile = serde_json::from_str(&text)?;

        let rows = raw.components.len();
        let cols = raw.components.first().map_or(0, Vec::len);
        if raw.components.iter().any(|r| r.len() != cols) {
            return Err(FlexError::Parse {
                path: path.to_owned(),
                line: 0,
                message: "ragged `components`".to_string(),
            });
        }
        let flat: Vec<f64> = raw.components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| FlexError::InvalidInput(e.to_string()))?;
        Self::new(Array1::from(raw.mean), components)
    }

    /// 保存为 JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> FlexResult<()> {
        let path = path.as_ref();
        let raw = PcaModelFile {
            mean: self.mean.to_vec(),
            components: self.components.rows().into_iter().map(|r| r.to_vec()).collect(),
        };
        let text = serde_json::to_string(&raw)?;
        fs::write(path, text).map_err(|e| FlexError::io(path, e))
    }
}

impl InverseTransform for PcaModel {
    #[inline]
    fn reduced_dim(&self) -> usize {
        self.components.nrows()
    }

    fn inverse_transform(&self, points: ArrayView2<f64>) -> FlexResult<Array2<f64>> {
        if points.ncols() != self.reduced_dim() {
            return Err(FlexError::shape(
                "trajectory point dimension",
                self.reduced_dim(),
                points.ncols(),
            ));
        }
        Ok(points.dot(&self.components) + &self.mean.view().insert_axis(Axis(0)))
    }
}

/// 线性投影 `Y = X · M` 的逆: `X = Y · pinv(M)`.
#[derive(Debug, Clone)]
pub struct LinearProjector {
    /// `[d, D]`.
    pinv: Array2<f64>,
}

impl LinearProjector {
    /// `matrix` 形状为 `[D, d]`.
    pub fn new(matrix: Array2<f64>, rcond: f64, condition_warn: f64) -> FlexResult<Self> {
        let p = pseudo_inverse(matrix.view(), rcond)?;
        p.report.log(condition_warn);
        Ok(Self { pinv: p.matrix })
    }

    /// 降维维度.
    #[inline]
    pub fn reduced_dim(&self) -> usize {
        self.pinv.nrows()
    }

    /// `[T, d]` -> `[T, D]`.
    pub fn apply(&self, points: ArrayView2<f64>) -> FlexResult<Array2<f64>> {
        if points.ncols() != self.reduced_dim() {
            return Err(FlexError::shape(
                "trajectory point dimension",
                self.reduced_dim(),
                points.ncols(),
            ));
        }
        Ok(points.dot(&self.pinv))
    }
}

/// 流水线开始时确定的逆映射方式.
#[derive(Debug)]
pub enum Projector {
    /// 线性投影矩阵.
    Linear(LinearProjector),

    /// 拟合模型.
    Fitted(Box<dyn InverseTransform>),

    /// 没有可用的映射, 退化为最近邻.
    NoProjector,
}

impl Projector {
    /// 根据运行目录下的文件确定逆映射方式.
    ///
    /// 1. 降维方法为 `sklearn_PCA` 且 PCA 模型存在时使用拟合模型;
    /// 2. 否则投影矩阵存在时使用线性逆;
    /// 3. 否则退化为最近邻.
    pub fn resolve(
        paths: &RunPaths,
        method: Option<&str>,
        rcond: f64,
        condition_warn: f64,
    ) -> FlexResult<Self> {
        let pca = paths.pca_model();
        if method == Some(SKLEARN_PCA) {
            if pca.is_file() {
                log::debug!("using fitted PCA model `{}`", pca.display());
                return Ok(Self::Fitted(Box::new(PcaModel::load(&pca)?)));
            }
            log::warn!(
                "method is {SKLEARN_PCA} but `{}` is missing; trying the linear projector",
                pca.display()
            );
        }

        let projector = paths.projector();
        if projector.is_file() {
            let m = textmat::read_matrix(&projector)?;
            return Ok(Self::Linear(LinearProjector::new(m, rcond, condition_warn)?));
        }
        Ok(Self::NoProjector)
    }

    /// 是否是精确逆映射.
    #[inline]
    pub fn is_exact(&self) -> bool {
        !matches!(self, Self::NoProjector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_pca_inverse_adds_mean() {
        let model = PcaModel::new(array![1.0, 2.0, 3.0], array![[1.0, 0.0, 0.0], [0.0, 1.0, 1.0]]).unwrap();
        let out = model.inverse_transform(array![[2.0, 3.0]].view()).unwrap();
        assert_eq!(out, array![[3.0, 5.0, 6.0]]);
        assert!(model.inverse_transform(array![[1.0]].view()).is_err());
    }

    #[test]
    fn test_pca_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pca_model.json");
        let model = PcaModel::new(array![0.5, -1.0], array![[1.0, 2.0]]).unwrap();
        model.save(&path).unwrap();
        assert_eq!(PcaModel::load(&path).unwrap(), model);

        fs::write(&path, r#"{"mean": [0.0, 0.0], "components": [[1.0, 2.0], [3.0]]}"#).unwrap();
        assert!(matches!(PcaModel::load(&path), Err(FlexError::Parse { .. })));
        fs::write(&path, r#"{"mean": [0.0], "components": [[1.0, 2.0]]}"#).unwrap();
        assert!(matches!(PcaModel::load(&path), Err(FlexError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_resolve_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path());
        let resolve = |m| Projector::resolve(&paths, m, 1e-10, 1e6).unwrap();

        assert!(matches!(resolve(Some(SKLEARN_PCA)), Projector::NoProjector));

        textmat::write_matrix(paths.projector(), array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]].view())
            .unwrap();
        assert!(matches!(resolve(None), Projector::Linear(_)));
        assert!(matches!(resolve(Some(SKLEARN_PCA)), Projector::Linear(_)));

        PcaModel::new(array![0.0, 0.0, 0.0], array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]])
            .unwrap()
            .save(paths.pca_model())
            .unwrap();
        assert!(matches!(resolve(Some(SKLEARN_PCA)), Projector::Fitted(_)));
        assert!(matches!(resolve(Some("matlab_PCA")), Projector::Linear(_)));
        assert!(resolve(None).is_exact());
    }
}
