//! NIfTI-1 体数据.

use std::path::Path;

use ndarray::{Array3, ArrayView3, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use super::VolumeError;

/// 读取 nii 文件, 返回 `[z, y, x]` 数组.
pub(super) fn read(path: &Path) -> Result<Array3<f32>, VolumeError> {
    if !path.exists() {
        return Err(VolumeError::io(
            path,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }
    let obj = ReaderOptions::new().read_file(path)?;

    // [x, y, z] -> [z, y, x].
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()?
        .into_dimensionality::<Ix3>()
        .map_err(|e| VolumeError::header(path, format!("expected a 3D volume: {e}")))?
        .permuted_axes([2, 1, 0]);

    Ok(data.as_standard_layout().into_owned())
}

/// 将 `[z, y, x]` 数组写为 nii 文件. 路径以 `.gz` 结尾时自动压缩.
pub(super) fn write(path: &Path, data: ArrayView3<f32>) -> Result<(), VolumeError> {
    // [z, y, x] -> [x, y, z].
    let xyz = data.permuted_axes([2, 1, 0]);
    WriterOptions::new(path).write_nifti(&xyz)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{read, write};
    use ndarray::Array3;

    #[test]
    fn test_nifti_axes_survive_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.nii");
        let a = Array3::<f32>::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        write(&path, a.view()).unwrap();
        let b = read(&path).unwrap();
        assert_eq!(b.dim(), (2, 3, 4));
        assert_eq!(a, b);
    }
}
