//! 光流场与光流矩阵 (flow bank).
//!
//! 光流矩阵的每一行是一个样本的三通道光流场在参考体数据网格上展平后的向量,
//! 形状为 `[N, 3 * Z * Y * X]`.

use ndarray::{s, Array2, Array4, ArrayView2, Axis};

use crate::consts::FlowAxis;
use crate::error::{FlexError, FlexResult};
use crate::volume::{Volume, VoxelGrid};
use crate::Idx3d;

pub mod cache;

pub use cache::{CacheKey, CachePolicy, FlowCache, PinvSource, ResolvedPinv};

/// 一个样本的三通道光流场. 三个分量共享同一网格.
#[derive(Debug, Clone)]
pub struct FlowField {
    stacked: Array4<f32>,
}

impl VoxelGrid for FlowField {
    #[inline]
    fn grid(&self) -> Idx3d {
        let (_, z, y, x) = self.stacked.dim();
        (z, y, x)
    }
}

impl FlowField {
    /// 由 x/y/z 三个分量体数据堆叠. 三者网格不一致时返回 [`FlexError::ShapeMismatch`].
    pub fn from_components(x: &Volume, y: &Volume, z: &Volume) -> FlexResult<Self> {
        let grid = x.grid();
        for (axis, v) in [(FlowAxis::Y, y), (FlowAxis::Z, z)] {
            if v.grid() != grid {
                return Err(FlexError::shape(
                    flow_component_name(axis),
                    format!("{grid:?}"),
                    format!("{:?}", v.grid()),
                ));
            }
        }

        let (gz, gy, gx) = grid;
        let mut stacked = Array4::<f32>::zeros((3, gz, gy, gx));
        for (axis, v) in [(FlowAxis::X, x), (FlowAxis::Y, y), (FlowAxis::Z, z)] {
            stacked
                .index_axis_mut(Axis(0), axis.channel())
                .assign(&v.data());
        }
        Ok(Self { stacked })
    }

    /// 由 `[3, Z, Y, X]` 数组直接创建.
    pub fn from_stacked(stacked: Array4<f32>) -> FlexResult<Self> {
        if stacked.len_of(Axis(0)) != 3 {
            return Err(FlexError::shape(
                "flow channels",
                3,
                stacked.len_of(Axis(0)),
            ));
        }
        let stacked = if stacked.is_standard_layout() {
            stacked
        } else {
            stacked.as_standard_layout().into_owned()
        };
        Ok(Self { stacked })
    }

    /// 由展平向量按 `grid` 还原.
    pub fn from_flat(flat: Vec<f32>, (z, y, x): Idx3d) -> FlexResult<Self> {
        let expected = 3 * z * y * x;
        if flat.len() != expected {
            return Err(FlexError::shape("flattened flow", expected, flat.len()));
        }
        let stacked = Array4::from_shape_vec((3, z, y, x), flat)
            .map_err(|e| FlexError::InvalidInput(e.to_string()))?;
        Ok(Self { stacked })
    }

    /// `[3, Z, Y, X]` 视图.
    #[inline]
    pub fn stacked(&self) -> ndarray::ArrayView4<'_, f32> {
        self.stacked.view()
    }

    /// 按行优先顺序迭代展平后的值.
    #[inline]
    pub fn flat_iter(&self) -> impl ExactSizeIterator<Item = &f32> {
        self.stacked.iter()
    }
}

#[inline]
fn flow_component_name(axis: FlowAxis) -> &'static str {
    match axis {
        FlowAxis::X => "flow x component",
        FlowAxis::Y => "flow y component",
        FlowAxis::Z => "flow z component",
    }
}

/// 按样本索引加载光流场的能力.
///
/// 索引从 1 开始, 与上游光流提取步骤的文件编号一致.
pub trait FlowFieldLoader {
    /// 加载第 `index` 个样本的光流场. 任一分量缺失都应返回错误.
    fn load(&mut self, index: u32) -> FlexResult<FlowField>;
}

impl<F> FlowFieldLoader for F
where
    F: FnMut(u32) -> FlexResult<FlowField>,
{
    #[inline]
    fn load(&mut self, index: u32) -> FlexResult<FlowField> {
        self(index)
    }
}

/// 光流矩阵. 行数等于样本数, 列数等于 `3 * Z * Y * X`.
#[derive(Debug, Clone)]
pub struct FlowBank {
    matrix: Array2<f64>,
    grid: Idx3d,
}

impl VoxelGrid for FlowBank {
    #[inline]
    fn grid(&self) -> Idx3d {
        self.grid
    }
}

impl FlowBank {
    /// 依次加载样本 `1..=sample_count` 的光流场并组装光流矩阵.
    ///
    /// 所有样本必须与第一个样本的网格一致. 任一样本加载失败则整体失败,
    /// 不会返回只覆盖部分样本的矩阵.
    pub fn build<L: FlowFieldLoader + ?Sized>(sample_count: u32, loader: &mut L) -> FlexResult<Self> {
        if sample_count == 0 {
            return Err(FlexError::InvalidInput(
                "flow bank needs at least one sample".to_string(),
            ));
        }

        let first = loader.load(1)?;
        let grid = first.grid();
        let cols = first.flow_len();
        let mut matrix = Array2::<f64>::zeros((sample_count as usize, cols));
        fill_row(&mut matrix, 0, &first);
        drop(first);

        for index in 2..=sample_count {
            let flow = loader.load(index)?;
            if flow.grid() != grid {
                return Err(FlexError::shape(
                    "flow field grid",
                    format!("{grid:?}"),
                    format!("{:?} (sample {index})", flow.grid()),
                ));
            }
            fill_row(&mut matrix, index as usize - 1, &flow);
            log::debug!("flow bank: loaded sample {index}/{sample_count}");
        }

        log::info!(
            "flow bank built: {} samples x {} values (grid {:?})",
            sample_count,
            cols,
            grid
        );
        Ok(Self { matrix, grid })
    }

    /// 由已有矩阵 (如缓存) 和网格创建. 列数必须等于 `3 * Z * Y * X`.
    pub fn from_matrix(matrix: Array2<f64>, grid: Idx3d) -> FlexResult<Self> {
        let (z, y, x) = grid;
        let expected = 3 * z * y * x;
        if matrix.ncols() != expected {
            return Err(FlexError::shape("flow bank columns", expected, matrix.ncols()));
        }
        Ok(Self { matrix, grid })
    }

    /// 样本数.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.matrix.nrows()
    }

    /// 矩阵视图.
    #[inline]
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }
}

#[inline]
fn fill_row(matrix: &mut Array2<f64>, row: usize, flow: &FlowField) {
    matrix
        .slice_mut(s![row, ..])
        .iter_mut()
        .zip(flow.flat_iter())
        .for_each(|(dst, &v)| *dst = v as f64);
}
