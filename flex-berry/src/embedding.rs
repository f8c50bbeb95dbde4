//! 降维嵌入: 每个样本在降维空间中的坐标.
//!
//! 提供按坐标轴的直方图 / 散点数据, 以及用于创建聚类的点选择.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::dataset::textmat;
use crate::error::{FlexError, FlexResult};

/// 降维空间中的一个点.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedPoint {
    /// 样本编号, 从 1 开始.
    pub id: u32,

    /// 降维坐标.
    pub coords: Array1<f64>,
}

impl ReducedPoint {
    /// 创建点.
    pub fn new(id: u32, coords: Array1<f64>) -> Self {
        Self { id, coords }
    }

    /// 降维维度.
    #[inline]
    pub fn dim(&self) -> usize {
        self.coords.len()
    }
}

/// 一次运行的全部降维点, 按样本顺序排列. 第 `i` 行的编号为 `i + 1`.
#[derive(Debug, Clone)]
pub struct Embedding {
    matrix: Array2<f64>,
    selected: Vec<bool>,
}

impl Embedding {
    /// 由 `[N, d]` 矩阵创建.
    pub fn from_matrix(matrix: Array2<f64>) -> FlexResult<Self> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(FlexError::InvalidInput(format!(
                "embedding must be non-empty, got {:?}",
                matrix.dim()
            )));
        }
        let selected = vec![false; matrix.nrows()];
        Ok(Self { matrix, selected })
    }

    /// 读取降维结果文本矩阵.
    pub fn load<P: AsRef<Path>>(path: P) -> FlexResult<Self> {
        Self::from_matrix(textmat::read_matrix(path)?)
    }

    /// 样本数.
    #[inline]
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    /// 是否为空. 合法的嵌入总是非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 降维维度.
    #[inline]
    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    /// `[N, d]` 坐标矩阵.
    #[inline]
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    /// 第 `axis` 维 (从 0 开始) 的全部坐标.
    #[inline]
    pub fn column(&self, axis: usize) -> ArrayView1<'_, f64> {
        self.matrix.column(axis)
    }

    /// 由若干坐标轴 (从 0 开始) 组成的散点数据 `[N, axes.len()]`.
    pub fn scatter(&self, axes: &[usize]) -> FlexResult<Array2<f64>> {
        if let Some(&bad) = axes.iter().find(|&&a| a >= self.dim()) {
            return Err(FlexError::InvalidInput(format!(
                "axis {} exceeds reduced dimension {}",
                bad + 1,
                self.dim()
            )));
        }
        Ok(self.matrix.select(Axis(1), axes))
    }

    /// 按样本顺序迭代所有点.
    pub fn points(&self) -> impl Iterator<Item = ReducedPoint> + '_ {
        self.matrix
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| ReducedPoint::new(i as u32 + 1, row.to_owned()))
    }

    /// 编号为 `id` 的点.
    pub fn point(&self, id: u32) -> Option<ReducedPoint> {
        let i = self.index_of(id)?;
        Some(ReducedPoint::new(id, self.matrix.row(i).to_owned()))
    }

    #[inline]
    fn index_of(&self, id: u32) -> Option<usize> {
        let i = (id as usize).checked_sub(1)?;
        (i < self.len()).then_some(i)
    }

    /// 按编号选中. 存在未知编号时不做任何修改并返回错误.
    pub fn select_ids(&mut self, ids: &[u32]) -> FlexResult<usize> {
        let indices = ids
            .iter()
            .map(|&id| {
                self.index_of(id).ok_or_else(|| {
                    FlexError::InvalidInput(format!(
                        "particle id {id} out of range 1..={}",
                        self.len()
                    ))
                })
            })
            .collect::<FlexResult<Vec<_>>>()?;
        for i in indices {
            self.selected[i] = true;
        }
        Ok(self.selected_count())
    }

    /// 选中与 `centre` 欧氏距离不超过 `radius` 的所有点. 返回新选中的点数.
    pub fn select_within(&mut self, centre: &[f64], radius: f64) -> FlexResult<usize> {
        if centre.len() != self.dim() {
            return Err(FlexError::shape("selection centre", self.dim(), centre.len()));
        }
        if !(radius >= 0.0) {
            return Err(FlexError::InvalidInput(format!("radius must be >= 0, got {radius}")));
        }

        let r2 = radius * radius;
        let mut added = 0;
        for (row, sel) in self.matrix.rows().into_iter().zip(self.selected.iter_mut()) {
            let d2: f64 = row.iter().zip(centre).map(|(a, b)| (a - b) * (a - b)).sum();
            if d2 <= r2 && !*sel {
                *sel = true;
                added += 1;
            }
        }
        Ok(added)
    }

    /// 取消所有选择.
    pub fn clear_selection(&mut self) {
        self.selected.fill(false);
    }

    /// 被选中的点数.
    #[inline]
    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    /// 被选中点的编号, 升序.
    pub fn selected_ids(&self) -> Vec<u32> {
        self.selected
            .iter()
            .positions(|&s| s)
            .map(|i| i as u32 + 1)
            .collect()
    }

    /// 将被选中点的编号写入 `path`, 每行一个. 返回写出的个数.
    ///
    /// 没有选中任何点时返回 [`FlexError::InvalidInput`], 不创建文件.
    pub fn write_selection<P: AsRef<Path>>(&self, path: P) -> FlexResult<usize> {
        let path = path.as_ref();
        let ids = self.selected_ids();
        if ids.is_empty() {
            return Err(FlexError::InvalidInput("no particle selected".to_string()));
        }

        let file = File::create(path).map_err(|e| FlexError::io(path, e))?;
        let mut w = BufWriter::new(file);
        let io = |e| FlexError::io(path, e);
        for id in &ids {
            writeln!(w, "{id}").map_err(io)?;
        }
        w.flush().map_err(io)?;
        Ok(ids.len())
    }
}

/// 解析坐标轴列表, 如 `"1 2"`. 输入从 1 开始, 返回从 0 开始的坐标轴.
///
/// 需要 1 至 3 个坐标轴, 且每个都不超过降维维度 `dim`.
pub fn parse_axes(s: &str, dim: usize) -> FlexResult<Vec<usize>> {
    let axes = s
        .split_whitespace()
        .map(|tok| match tok.parse::<usize>() {
            Ok(a) if (1..=dim).contains(&a) => Ok(a - 1),
            Ok(a) => Err(FlexError::InvalidInput(format!(
                "axis {a} out of range 1..={dim}"
            ))),
            Err(_) => Err(FlexError::InvalidInput(format!("`{tok}` is not an axis"))),
        })
        .collect::<FlexResult<Vec<_>>>()?;

    match axes.len() {
        1..=3 => Ok(axes),
        n => Err(FlexError::InvalidInput(format!(
            "expected 1 to 3 axes, got {n}"
        ))),
    }
}

/// 一维直方图. `edges.len() == counts.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// 区间边界, 升序.
    pub edges: Vec<f64>,

    /// 每个区间的计数. 最后一个区间包含右端点.
    pub counts: Vec<usize>,
}

impl Histogram {
    /// 对 `values` 中的有限值按等宽区间计数.
    ///
    /// 所有值相同时区间为 `[v - 0.5, v + 0.5]`.
    pub fn new(values: ArrayView1<f64>, bins: usize) -> FlexResult<Self> {
        if bins == 0 {
            return Err(FlexError::InvalidInput("histogram needs at least one bin".to_string()));
        }
        let (lo, hi) = match values.iter().copied().filter(|v| v.is_finite()).minmax() {
            MinMaxResult::NoElements => {
                return Err(FlexError::InvalidInput("no finite values to bin".to_string()))
            }
            MinMaxResult::OneElement(v) => (v - 0.5, v + 0.5),
            MinMaxResult::MinMax(lo, hi) if lo == hi => (lo - 0.5, hi + 0.5),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };

        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0; bins];
        for v in values.iter().copied().filter(|v| v.is_finite()) {
            let b = (((v - lo) / width) as usize).min(bins - 1);
            counts[b] += 1;
        }
        Ok(Self { edges, counts })
    }

    /// 计数总和.
    #[inline]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
