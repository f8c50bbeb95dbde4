//! 3D 体数据及其文件格式.
//!
//! 体数据统一以 `[z, y, x]` (切片, 行, 列) 顺序访问, 即最后一维变化最快.

use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use thiserror::Error;

use crate::Idx3d;

mod nii;
mod preview;
mod spider;
pub mod warp;

pub use preview::ImgWritePreview;
pub use warp::warp_by_flow;

/// 体数据读写错误.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// 底层 I/O 错误.
    #[error("I/O error on volume `{}`: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 原始错误.
        #[source]
        source: std::io::Error,
    },

    /// NIfTI 读写错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 文件头非法或不受支持.
    #[error("bad volume header in `{}`: {message}", path.display())]
    BadHeader {
        /// 出错的路径.
        path: PathBuf,
        /// 描述.
        message: String,
    },

    /// 无法从扩展名判断格式.
    #[error("unsupported volume format `{}`", .0.display())]
    UnsupportedFormat(PathBuf),
}

impl VolumeError {
    #[inline]
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            source,
        }
    }

    #[inline]
    pub(crate) fn header(path: &Path, message: impl Into<String>) -> Self {
        Self::BadHeader {
            path: path.to_owned(),
            message: message.into(),
        }
    }

    /// 是否是 "文件不存在" 错误.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// 体数据文件格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeFormat {
    /// Spider 格式 (`.spi`, `.vol`, `.spider`).
    Spider,

    /// NIfTI-1 格式 (`.nii`, `.nii.gz`).
    Nifti,
}

impl VolumeFormat {
    /// 根据扩展名判断格式. 无法识别时返回 `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            return Some(Self::Nifti);
        }
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "spi" | "vol" | "spider" => Some(Self::Spider),
            _ => None,
        }
    }
}

/// 规则体素网格的共用属性.
pub trait VoxelGrid {
    /// 网格形状 `(z, y, x)`.
    fn grid(&self) -> Idx3d;

    /// 体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, y, x) = self.grid();
        z * y * x
    }

    /// 三通道光流在该网格上展平后的长度, 即 `3 * size`.
    #[inline]
    fn flow_len(&self) -> usize {
        3 * self.size()
    }
}

/// 标量体数据. 值以 `f32` 保存.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl VoxelGrid for Volume {
    #[inline]
    fn grid(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl From<Array3<f32>> for Volume {
    #[inline]
    fn from(data: Array3<f32>) -> Self {
        Self::new(data)
    }
}

impl Volume {
    /// 由 `[z, y, x]` 数组直接创建. 非标准内存布局的数组会被复制为标准布局.
    pub fn new(data: Array3<f32>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        debug_assert!(data.is_standard_layout());
        Self { data }
    }

    /// 创建全零体数据.
    #[inline]
    pub fn zeros(grid: Idx3d) -> Self {
        Self {
            data: Array3::zeros(grid),
        }
    }

    /// 打开体数据文件, 格式由扩展名决定.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
        let path = path.as_ref();
        let data = match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Spider) => spider::read(path)?,
            Some(VolumeFormat::Nifti) => nii::read(path)?,
            None => return Err(VolumeError::UnsupportedFormat(path.to_owned())),
        };
        Ok(Self::new(data))
    }

    /// 保存体数据, 格式由扩展名决定.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VolumeError> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Spider) => spider::write(path, self.data.view()),
            Some(VolumeFormat::Nifti) => nii::write(path, self.data.view()),
            None => Err(VolumeError::UnsupportedFormat(path.to_owned())),
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获取第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 体素值的最小值和最大值. 忽略非有限值; 若不存在有限值则返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Volume, VolumeFormat, VoxelGrid};
    use ndarray::Array3;
    use std::path::Path;

    #[test]
    fn test_format_from_extension() {
        let f = |s: &str| VolumeFormat::from_path(Path::new(s));
        assert_eq!(f("reference.spi"), Some(VolumeFormat::Spider));
        assert_eq!(f("a/animation_x000deformed_by_opflow.vol"), Some(VolumeFormat::Spider));
        assert_eq!(f("REF.SPIDER"), Some(VolumeFormat::Spider));
        assert_eq!(f("scan.nii"), Some(VolumeFormat::Nifti));
        assert_eq!(f("scan.nii.gz"), Some(VolumeFormat::Nifti));
        assert_eq!(f("scan.mrc"), None);
        assert_eq!(f("noext"), None);
    }

    #[test]
    fn test_grid_attrs() {
        let v = Volume::zeros((2, 3, 4));
        assert_eq!(v.grid(), (2, 3, 4));
        assert_eq!(v.size(), 24);
        assert_eq!(v.flow_len(), 72);
    }

    #[test]
    fn test_non_standard_layout_is_normalized() {
        let a = Array3::<f32>::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let t = a.clone().permuted_axes([2, 1, 0]);
        let v = Volume::new(t);
        assert!(v.data().is_standard_layout());
        assert_eq!(v[(3, 2, 1)], a[(1, 2, 3)]);
    }

    #[test]
    fn test_min_max_skips_nan() {
        let mut v = Volume::zeros((1, 2, 2));
        v[(0, 0, 0)] = f32::NAN;
        v[(0, 0, 1)] = -2.0;
        v[(0, 1, 1)] = 5.0;
        assert_eq!(v.min_max(), Some((-2.0, 5.0)));

        let all_nan = Volume::new(Array3::from_elem((1, 1, 2), f32::NAN));
        assert_eq!(all_nan.min_max(), None);
    }
}
