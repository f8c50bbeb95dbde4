//! 体数据的快速预览图.

use std::path::Path;

use image::ImageResult;

use super::{Volume, VoxelGrid};

/// 表明一个可以保存为 **可视化友好** 预览图的体数据对象.
///
/// 预览图是中心 z 切片的 8-bit 灰度图, 按切片自身的最小值/最大值线性拉伸,
/// 仅用于人工检查动画帧, 不能作为数据交换格式.
pub trait ImgWritePreview {
    /// 将中心切片的预览图保存到 `path` 路径.
    fn save_preview<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 将 `v` 从 `[lo, hi]` 线性映射到 `[0, 255]`. 常数切片映射为黑色.
#[inline]
pub(crate) fn stretch(v: f32, lo: f32, hi: f32) -> u8 {
    if !v.is_finite() || hi <= lo {
        return u8::MIN;
    }
    // 255, not 256.
    ((v.clamp(lo, hi) - lo) / (hi - lo) * 255.0).round() as u8
}

impl ImgWritePreview for Volume {
    fn save_preview<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (z, height, width) = self.grid();
        let sli = self.slice_at(z / 2);
        let (lo, hi) = sli
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));

        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &v) in sli.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([stretch(v, lo, hi)]));
        }
        buf.save(path)
    }
}
