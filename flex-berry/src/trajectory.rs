//! 降维空间中的轨迹.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};

use crate::dataset::textmat;
use crate::embedding::ReducedPoint;
use crate::error::{FlexError, FlexResult};

/// 有序的降维点序列. 点的编号在轨迹内唯一.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    points: Vec<ReducedPoint>,
}

impl Trajectory {
    /// 空轨迹.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 `[T, d]` 矩阵创建, 第 `i` 行的编号为 `i + 1`.
    pub fn from_matrix(m: ArrayView2<f64>) -> FlexResult<Self> {
        let mut ans = Self::new();
        for (i, row) in m.rows().into_iter().enumerate() {
            ans.push(ReducedPoint::new(i as u32 + 1, row.to_owned()))?;
        }
        Ok(ans)
    }

    /// 沿控制点折线按弧长等距取 `n` 个点 (包含两端) 组成轨迹.
    pub fn from_control_points(control: ArrayView2<f64>, n: usize) -> FlexResult<Self> {
        Self::from_matrix(resample_polyline(control, n)?.view())
    }

    /// 追加一个点. 编号重复或维度不一致时返回错误.
    pub fn push(&mut self, point: ReducedPoint) -> FlexResult<()> {
        if let Some(dim) = self.dim() {
            if point.dim() != dim {
                return Err(FlexError::shape("trajectory point", dim, point.dim()));
            }
        }
        if self.points.iter().any(|p| p.id == point.id) {
            return Err(FlexError::InvalidInput(format!(
                "duplicate point id {} in trajectory",
                point.id
            )));
        }
        self.points.push(point);
        Ok(())
    }

    /// 点数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 降维维度. 空轨迹返回 `None`.
    #[inline]
    pub fn dim(&self) -> Option<usize> {
        self.points.first().map(ReducedPoint::dim)
    }

    /// 按顺序排列的点.
    #[inline]
    pub fn points(&self) -> &[ReducedPoint] {
        &self.points
    }

    /// `[T, d]` 坐标矩阵. 空轨迹返回 [`FlexError::InvalidInput`].
    pub fn as_matrix(&self) -> FlexResult<Array2<f64>> {
        let dim = self
            .dim()
            .ok_or_else(|| FlexError::InvalidInput("empty trajectory".to_string()))?;
        let mut m = Array2::zeros((self.len(), dim));
        for (mut row, p) in m.rows_mut().into_iter().zip(&self.points) {
            row.assign(&p.coords);
        }
        Ok(m)
    }

    /// 以文本矩阵保存.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> FlexResult<()> {
        textmat::write_matrix(path, self.as_matrix()?.view())
    }

    /// 读取文本矩阵保存的轨迹.
    pub fn load<P: AsRef<Path>>(path: P) -> FlexResult<Self> {
        Self::from_matrix(textmat::read_matrix(path)?.view())
    }
}

/// 沿 `control` 各行组成的折线按弧长等距采样 `n` 个点, 包含两端.
///
/// 只有一个控制点或折线长度为 0 时所有采样点都等于第一个控制点.
pub fn resample_polyline(control: ArrayView2<f64>, n: usize) -> FlexResult<Array2<f64>> {
    let (k, dim) = control.dim();
    if k == 0 || dim == 0 {
        return Err(FlexError::InvalidInput("no control points".to_string()));
    }
    if n == 0 {
        return Err(FlexError::InvalidInput(
            "number of trajectory points must be positive".to_string(),
        ));
    }

    // cum[i] 为从第一个控制点到第 i 个控制点的弧长.
    let mut cum = Vec::with_capacity(k);
    cum.push(0.0);
    for i in 1..k {
        let d = &control.row(i) - &control.row(i - 1);
        cum.push(cum[i - 1] + d.dot(&d).sqrt());
    }
    let total = cum[k - 1];

    let mut out = Array2::zeros((n, dim));
    if k == 1 || total == 0.0 {
        for mut row in out.rows_mut() {
            row.assign(&control.row(0));
        }
        return Ok(out);
    }

    let mut seg = 1;
    for (j, mut row) in out.rows_mut().into_iter().enumerate() {
        let s = if n == 1 {
            0.0
        } else {
            total * j as f64 / (n - 1) as f64
        };
        while seg < k - 1 && cum[seg] < s {
            seg += 1;
        }
        let len = cum[seg] - cum[seg - 1];
        let t = if len > 0.0 {
            ((s - cum[seg - 1]) / len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let a = control.row(seg - 1);
        let b = control.row(seg);
        let p: Array1<f64> = &a + &((&b - &a) * t);
        row.assign(&p);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: &Array2<f64>, b: &Array2<f64>) -> bool {
        a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_resample_by_arc_length() {
        // 折线长度 3 + 1 = 4.
        let control = array![[0.0, 0.0], [3.0, 0.0], [3.0, 1.0]];
        let out = resample_polyline(control.view(), 5).unwrap();
        let expected = array![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [3.0, 1.0]];
        assert!(close(&out, &expected), "{out:?}");

        let two = resample_polyline(control.view(), 2).unwrap();
        assert!(close(&two, &array![[0.0, 0.0], [3.0, 1.0]]));
    }

    #[test]
    fn test_resample_degenerate() {
        let one = resample_polyline(array![[1.0, 2.0]].view(), 3).unwrap();
        assert!(close(&one, &array![[1.0, 2.0], [1.0, 2.0], [1.0, 2.0]]));

        let still = resample_polyline(array![[1.0], [1.0]].view(), 2).unwrap();
        assert!(close(&still, &array![[1.0], [1.0]]));

        // 重复的控制点不影响结果.
        let dup = resample_polyline(array![[0.0], [0.0], [2.0]].view(), 3).unwrap();
        assert!(close(&dup, &array![[0.0], [1.0], [2.0]]));

        assert!(resample_polyline(array![[1.0]].view(), 0).is_err());
        assert!(resample_polyline(Array2::<f64>::zeros((0, 2)).view(), 3).is_err());
    }

    #[test]
    fn test_push_rejects_duplicates_and_dim_mismatch() {
        let mut t = Trajectory::new();
        t.push(ReducedPoint::new(1, array![0.0, 0.0])).unwrap();
        assert!(t.push(ReducedPoint::new(1, array![1.0, 1.0])).is_err());
        assert!(matches!(
            t.push(ReducedPoint::new(2, array![1.0])),
            Err(FlexError::ShapeMismatch { .. })
        ));
        t.push(ReducedPoint::new(7, array![2.0, 2.0])).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.as_matrix().unwrap(), array![[0.0, 0.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("animation_atrajectory.txt");
        let t = Trajectory::from_control_points(array![[0.0, 0.0], [2.0, 2.0]].view(), 3).unwrap();
        t.save(&path).unwrap();

        let back = Trajectory::load(&path).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.points()[2].id, 3);
        assert!(Trajectory::new().save(dir.path().join("e.txt")).is_err());
    }
}
