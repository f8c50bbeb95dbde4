//! Spider 体数据格式.
//!
//! 文件头由 `LABBYT` 字节的 `f32` 字组成 (下文按 1 起始编号):
//!
//! | 字 | 含义 |
//! |---|---|
//! | 1 | NZ, 切片数 |
//! | 2 | NY, 行数 |
//! | 3 | IREC, 总记录数 |
//! | 5 | IFORM, 1 = 2D 图像, 3 = 3D 体数据 |
//! | 6 | IMAMI, 统计量是否已计算 |
//! | 7 / 8 / 9 / 10 | FMAX / FMIN / AV / SIG |
//! | 12 | NX, 列数 |
//! | 13 | LABREC, 头部记录数 |
//! | 22 | LABBYT, 头部字节数 |
//! | 23 | LENBYT, 记录字节数 |
//! | 24 | ISTACK, 非零代表堆栈文件 |
//!
//! 头部之后按 `[z, y, x]` 顺序存储 `NZ * NY * NX` 个 `f32`.
//! 字节序在读取时根据 IFORM 是否合理来判断, 写入时总是小端.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{Array3, ArrayView3};

use super::VolumeError;

const W_NZ: usize = 0;
const W_NY: usize = 1;
const W_IREC: usize = 2;
const W_IFORM: usize = 4;
const W_IMAMI: usize = 5;
const W_FMAX: usize = 6;
const W_FMIN: usize = 7;
const W_AV: usize = 8;
const W_SIG: usize = 9;
const W_NX: usize = 11;
const W_LABREC: usize = 12;
const W_SCALE: usize = 20;
const W_LABBYT: usize = 21;
const W_LENBYT: usize = 22;
const W_ISTACK: usize = 23;

/// 读取头部所需的最少字数.
const MIN_HEADER_WORDS: usize = W_ISTACK + 1;

const IFORM_IMAGE: i64 = 1;
const IFORM_VOLUME: i64 = 3;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[inline]
    fn f32_at(self, bytes: &[u8], offset: usize) -> f32 {
        let mut w = [0u8; 4];
        w.copy_from_slice(&bytes[offset..offset + 4]);
        match self {
            ByteOrder::Little => f32::from_le_bytes(w),
            ByteOrder::Big => f32::from_be_bytes(w),
        }
    }

    #[inline]
    fn word(self, bytes: &[u8], index: usize) -> f32 {
        self.f32_at(bytes, index * 4)
    }

    /// IFORM 为 1 或 3 且三个维度都是正整数时, 认为字节序正确.
    fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MIN_HEADER_WORDS * 4 {
            return None;
        }
        [ByteOrder::Little, ByteOrder::Big].into_iter().find(|order| {
            let iform = order.word(bytes, W_IFORM);
            let dims_ok = [W_NZ, W_NY, W_NX]
                .into_iter()
                .all(|i| as_count(order.word(bytes, i)).is_some_and(|n| n > 0));
            dims_ok && matches!(as_int(iform), Some(IFORM_IMAGE | IFORM_VOLUME))
        })
    }
}

/// 头部中的整数字段以浮点数存储.
#[inline]
fn as_int(v: f32) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

#[inline]
fn as_count(v: f32) -> Option<usize> {
    as_int(v).and_then(|i| usize::try_from(i).ok())
}

/// 读取 Spider 文件, 返回 `[z, y, x]` 数组.
pub(super) fn read(path: &Path) -> Result<Array3<f32>, VolumeError> {
    let bytes = fs::read(path).map_err(|e| VolumeError::io(path, e))?;
    let order = ByteOrder::detect(&bytes)
        .ok_or_else(|| VolumeError::header(path, "not a spider image or volume"))?;
    let word = |i: usize| order.word(&bytes, i);

    if as_int(word(W_ISTACK)).is_some_and(|s| s > 0) {
        return Err(VolumeError::header(path, "spider stacks are not supported"));
    }

    // 已在 `detect` 中检查过.
    let nz = as_count(word(W_NZ)).unwrap_or(1);
    let ny = as_count(word(W_NY)).unwrap_or(0);
    let nx = as_count(word(W_NX)).unwrap_or(0);
    let labbyt = as_count(word(W_LABBYT))
        .filter(|&b| b >= MIN_HEADER_WORDS * 4)
        .ok_or_else(|| VolumeError::header(path, "invalid LABBYT"))?;

    // 头部数值不可信, 分配前先与文件长度比较.
    let available = bytes.len().saturating_sub(labbyt) / 4;
    let n = match nz.checked_mul(ny).and_then(|v| v.checked_mul(nx)) {
        Some(n) if labbyt <= bytes.len() && n <= available => n,
        Some(n) => {
            return Err(VolumeError::header(
                path,
                format!(
                    "truncated data: header declares {n} voxels after {labbyt} header bytes, file has {} bytes",
                    bytes.len()
                ),
            ))
        }
        None => {
            return Err(VolumeError::header(
                path,
                format!("volume size {nz}x{ny}x{nx} overflows"),
            ))
        }
    };

    let data: Vec<f32> = (0..n).map(|k| order.f32_at(&bytes, labbyt + 4 * k)).collect();
    Array3::from_shape_vec((nz, ny, nx), data)
        .map_err(|e| VolumeError::header(path, e.to_string()))
}

/// 头部记录数与字节数. 头部至少 1024 字节且是整数条记录.
#[inline]
fn header_layout(nx: usize) -> (usize, usize) {
    let lenbyt = nx * 4;
    let mut labrec = 1024 / lenbyt;
    if 1024 % lenbyt != 0 {
        labrec += 1;
    }
    (labrec, labrec * lenbyt)
}

/// 以 Spider 体数据格式 (IFORM = 3) 写入 `[z, y, x]` 数组.
pub(super) fn write(path: &Path, data: ArrayView3<f32>) -> Result<(), VolumeError> {
    let (nz, ny, nx) = data.dim();
    if nz == 0 || ny == 0 || nx == 0 {
        return Err(VolumeError::header(path, "cannot write an empty volume"));
    }
    let (labrec, labbyt) = header_layout(nx);

    let (fmin, fmax, av, sig) = statistics(data);
    let mut header = vec![0.0f32; labbyt / 4];
    header[W_NZ] = nz as f32;
    header[W_NY] = ny as f32;
    header[W_IREC] = (nz * ny + labrec) as f32;
    header[W_IFORM] = IFORM_VOLUME as f32;
    header[W_IMAMI] = 1.0;
    header[W_FMAX] = fmax;
    header[W_FMIN] = fmin;
    header[W_AV] = av;
    header[W_SIG] = sig;
    header[W_NX] = nx as f32;
    header[W_LABREC] = labrec as f32;
    header[W_SCALE] = 1.0;
    header[W_LABBYT] = labbyt as f32;
    header[W_LENBYT] = (nx * 4) as f32;

    let file = File::create(path).map_err(|e| VolumeError::io(path, e))?;
    let mut w = BufWriter::new(file);
    let io = |e| VolumeError::io(path, e);
    for v in header.iter() {
        w.write_all(&v.to_le_bytes()).map_err(io)?;
    }
    // 逻辑顺序迭代, 与内存布局无关.
    for v in data.iter() {
        w.write_all(&v.to_le_bytes()).map_err(io)?;
    }
    w.flush().map_err(io)
}

/// `(min, max, mean, std)`.
fn statistics(data: ArrayView3<f32>) -> (f32, f32, f32, f32) {
    let n = data.len() as f64;
    let (mut lo, mut hi) = (f32::MAX, f32::MIN);
    let (mut sum, mut sum2) = (0.0f64, 0.0f64);
    for &v in data.iter() {
        lo = lo.min(v);
        hi = hi.max(v);
        sum += v as f64;
        sum2 += (v as f64) * (v as f64);
    }
    let mean = sum / n;
    let var = (sum2 / n - mean * mean).max(0.0);
    (lo, hi, mean as f32, var.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_header_layout() {
        // 小体数据: 头部 1024 字节.
        assert_eq!(header_layout(2), (128, 1024));
        assert_eq!(header_layout(3), (86, 1032));
        // 单条记录已超过 1024 字节.
        assert_eq!(header_layout(300), (1, 1200));
    }

    #[test]
    fn test_write_then_read_keeps_layout_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.spi");
        let a = Array3::<f32>::from_shape_fn((2, 3, 5), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        write(&path, a.view()).unwrap();

        let bytes = fs::read(&path).unwrap();
        let order = ByteOrder::detect(&bytes).unwrap();
        assert_eq!(order, ByteOrder::Little);
        assert_eq!(order.word(&bytes, W_NZ), 2.0);
        assert_eq!(order.word(&bytes, W_NY), 3.0);
        assert_eq!(order.word(&bytes, W_NX), 5.0);
        assert_eq!(order.word(&bytes, W_IFORM), 3.0);
        assert_eq!(order.word(&bytes, W_FMIN), 0.0);
        assert_eq!(order.word(&bytes, W_FMAX), 124.0);
        assert_eq!(order.word(&bytes, W_LABBYT), 1040.0);
        assert_eq!(bytes.len(), 1040 + 30 * 4);

        let b = read(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_read_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("be.spi");
        let (nz, ny, nx) = (1usize, 2usize, 2usize);
        let (_, labbyt) = header_layout(nx);
        let mut header = vec![0.0f32; labbyt / 4];
        header[W_NZ] = nz as f32;
        header[W_NY] = ny as f32;
        header[W_IFORM] = 1.0;
        header[W_NX] = nx as f32;
        header[W_LABBYT] = labbyt as f32;
        let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_be_bytes()).collect();
        for v in [1.5f32, -2.0, 3.25, 4.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        fs::write(&path, bytes).unwrap();

        let a = read(&path).unwrap();
        assert_eq!(a.dim(), (1, 2, 2));
        assert_eq!(a[(0, 0, 0)], 1.5);
        assert_eq!(a[(0, 0, 1)], -2.0);
        assert_eq!(a[(0, 1, 0)], 3.25);
        assert_eq!(a[(0, 1, 1)], 4.0);
    }

    #[test]
    fn test_read_rejects_garbage_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("g.spi");
        fs::write(&garbage, vec![0xffu8; 2048]).unwrap();
        assert!(matches!(read(&garbage), Err(VolumeError::BadHeader { .. })));

        let short = dir.path().join("s.spi");
        let a = Array3::<f32>::ones((2, 2, 2));
        write(&short, a.view()).unwrap();
        let mut bytes = fs::read(&short).unwrap();
        bytes.truncate(bytes.len() - 4);
        fs::write(&short, bytes).unwrap();
        assert!(matches!(read(&short), Err(VolumeError::BadHeader { .. })));
    }

    #[test]
    fn test_read_rejects_oversized_header_dims() {
        let dir = tempfile::tempdir().unwrap();
        for dim in [(1u64 << 21) as f32, (1u64 << 22) as f32, 1e30] {
            let path = dir.path().join("huge.spi");
            let mut header = vec![0.0f32; 256];
            header[W_NZ] = dim;
            header[W_NY] = dim;
            header[W_IFORM] = 3.0;
            header[W_NX] = dim;
            header[W_LABBYT] = 1024.0;
            let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
            bytes.extend_from_slice(&[0u8; 64]);
            fs::write(&path, bytes).unwrap();
            assert!(
                matches!(read(&path), Err(VolumeError::BadHeader { .. })),
                "dim {dim}"
            );
        }
    }

    #[test]
    fn test_read_missing_file() {
        let err = read(Path::new("/definitely/not/here.spi")).unwrap_err();
        assert!(err.is_not_found());
    }
}
