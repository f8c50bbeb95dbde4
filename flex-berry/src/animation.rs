//! 由形变向量生成体数据动画.
//!
//! 每个形变向量经伪逆映射为一个三通道光流场, 再对参考体数据做形变得到一帧.
//! 光流场逐帧计算, 不会同时保存全部帧的光流.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use ndarray::{ArrayView1, ArrayView2, Axis};

use crate::consts::DEFAULT_MAX_FRAME_RATE;
use crate::dataset::RunPaths;
use crate::error::{FlexError, FlexResult};
use crate::flow::FlowField;
use crate::volume::{warp_by_flow, ImgWritePreview, Volume, VoxelGrid};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 动画帧序列, 顺序与形变向量一致.
#[derive(Debug, Clone, Default)]
pub struct DeformedVolumeSequence {
    frames: Vec<Volume>,
}

impl DeformedVolumeSequence {
    /// 帧数.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 所有帧.
    #[inline]
    pub fn frames(&self) -> &[Volume] {
        &self.frames
    }

    /// 按 `animation_<name><i:03>deformed_by_opflow.vol` 写出所有帧. 返回写出的路径.
    ///
    /// 动画目录必须已经存在, 见 [`prepare_animation_dir`].
    pub fn write(&self, paths: &RunPaths, name: &str) -> FlexResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.len());
        for (i, frame) in self.frames.iter().enumerate() {
            let path = paths.frame_path(name, i);
            frame.save(&path)?;
            log::debug!("frame {i} written to `{}`", path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// 为每一帧写出中心切片预览图 (`<帧文件>.png`).
    pub fn write_previews(&self, paths: &RunPaths, name: &str) -> FlexResult<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            let path = paths.frame_path(name, i).with_extension("png");
            frame.save_preview(&path)?;
        }
        Ok(())
    }
}

/// 清空并重新创建动画目录.
pub fn prepare_animation_dir(paths: &RunPaths, name: &str) -> FlexResult<PathBuf> {
    let dir = paths.animation_dir(name);
    match fs::remove_dir_all(&dir) {
        Ok(()) => log::debug!("removed previous animation `{}`", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(FlexError::io(dir, e)),
    }
    fs::create_dir_all(&dir).map_err(|e| FlexError::io(&dir, e))?;
    Ok(dir)
}

fn check_shapes(deformations: &ArrayView2<f64>, pinv: &ArrayView2<f64>, reference: &Volume) -> FlexResult<()> {
    if pinv.nrows() != reference.flow_len() {
        return Err(FlexError::shape(
            "pseudo-inverse rows (3 * reference voxels)",
            reference.flow_len(),
            pinv.nrows(),
        ));
    }
    if deformations.ncols() != pinv.ncols() {
        return Err(FlexError::shape(
            "deformation length (flow bank samples)",
            pinv.ncols(),
            deformations.ncols(),
        ));
    }
    Ok(())
}

/// 用一个形变向量计算光流场并形变参考体数据.
fn warp_one(d: ArrayView1<f64>, pinv: &ArrayView2<f64>, reference: &Volume) -> FlexResult<Volume> {
    let flat: Vec<f32> = pinv.dot(&d).iter().map(|&v| v as f32).collect();
    let flow = FlowField::from_flat(flat, reference.grid())?;
    Ok(Volume::new(warp_by_flow(reference.data(), flow.stacked())?))
}

/// 逐帧生成动画: 对 `deformations` 的每一行 `d`, 光流 `= pinv · d`.
///
/// `pinv` 形状为 `[3 * Z * Y * X, N]`, 网格必须与 `reference` 一致;
/// `deformations` 形状为 `[T, N]`. 否则返回 [`FlexError::ShapeMismatch`].
pub fn warp_sequence(
    deformations: ArrayView2<f64>,
    pinv: ArrayView2<f64>,
    reference: &Volume,
) -> FlexResult<DeformedVolumeSequence> {
    check_shapes(&deformations, &pinv, reference)?;
    let total = deformations.nrows();
    let frames = deformations
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, d)| {
            log::debug!("warping frame {}/{total}", i + 1);
            warp_one(d, &pinv, reference)
        })
        .collect::<FlexResult<Vec<_>>>()?;
    Ok(DeformedVolumeSequence { frames })
}

/// 借助 `rayon`, 并行生成与 [`warp_sequence`] 完全相同的动画.
#[cfg(feature = "rayon")]
pub fn par_warp_sequence(
    deformations: ArrayView2<f64>,
    pinv: ArrayView2<f64>,
    reference: &Volume,
) -> FlexResult<DeformedVolumeSequence> {
    check_shapes(&deformations, &pinv, reference)?;
    let frames = deformations
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|d| warp_one(d, &pinv, reference))
        .collect::<FlexResult<Vec<_>>>()?;
    Ok(DeformedVolumeSequence { frames })
}

/// ChimeraX 播放脚本.
#[derive(Debug, Clone, PartialEq)]
pub struct ChimeraScript {
    /// 动画目录名, 相对于运行目录.
    pub animation_stem: String,

    /// 是否循环播放.
    pub looping: bool,

    /// 是否往返播放.
    pub oscillate: bool,

    /// 最大帧率.
    pub max_frame_rate: u32,
}

impl ChimeraScript {
    /// 默认播放参数: 循环, 往返, 帧率 5.
    pub fn new(name: &str) -> Self {
        Self {
            animation_stem: RunPaths::animation_stem(name),
            looping: true,
            oscillate: true,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
        }
    }

    /// 脚本内容.
    pub fn render(&self) -> String {
        let mut s = String::with_capacity(128);
        // String 的 fmt::Write 不会失败.
        let _ = writeln!(s, "open {}/*.vol vseries true", self.animation_stem);
        let _ = write!(
            s,
            "vseries play #1 loop {} maxFrameRate {}",
            self.looping, self.max_frame_rate
        );
        if self.oscillate {
            s.push_str(" direction oscillate");
        }
        s.push('\n');
        s
    }

    /// 写出脚本.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> FlexResult<()> {
        let path = path.as_ref();
        fs::write(path, self.render()).map_err(|e| FlexError::io(path, e))
    }
}

/// 以 `command <script>` 启动查看器并等待其退出. 工作目录为脚本所在目录.
pub fn launch_viewer(command: &str, script: &Path) -> FlexResult<()> {
    let mut cmd = Command::new(command);
    cmd.arg(script);
    if let Some(dir) = script.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }
    log::info!("launching viewer: {command} {}", script.display());

    let status = cmd
        .status()
        .map_err(|e| FlexError::Viewer(format!("cannot start `{command}`: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(FlexError::Viewer(format!("`{command}` exited with {status}")))
    }
}
