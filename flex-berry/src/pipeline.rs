//! 轨迹重建流水线.
//!
//! 所有操作都显式接受 [`RunContext`], 不依赖任何全局状态.

use std::path::{Path, PathBuf};

use crate::animation::{self, ChimeraScript};
use crate::config::FlexConfig;
use crate::dataset::{textmat, DirFlowLoader, RunPaths};
use crate::embedding::Embedding;
use crate::error::{FlexError, FlexResult};
use crate::flow::{CacheKey, FlowCache, PinvSource, ResolvedPinv};
use crate::reconstruct::{self, Projector, ReconstructionMode, SampleTable};
use crate::trajectory::Trajectory;
use crate::volume::{Volume, VoxelGrid};

/// 一次运行的上下文: 运行目录和配置.
#[derive(Debug, Clone)]
pub struct RunContext {
    paths: RunPaths,
    config: FlexConfig,
}

impl RunContext {
    /// 以 `run_dir` 为运行目录. 配置会先被校验.
    pub fn new<P: AsRef<Path>>(run_dir: P, config: FlexConfig) -> FlexResult<Self> {
        config.validate()?;
        Ok(Self {
            paths: RunPaths::new(run_dir),
            config,
        })
    }

    /// 运行目录下的路径.
    #[inline]
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &FlexConfig {
        &self.config
    }

    /// 参考体数据路径.
    pub fn reference_path(&self) -> PathBuf {
        self.config
            .reference
            .clone()
            .unwrap_or_else(|| self.paths.reference())
    }

    /// 光流文件目录.
    pub fn flow_dir(&self) -> PathBuf {
        self.config
            .flow_dir
            .clone()
            .unwrap_or_else(|| self.paths.flow_dir())
    }

    /// 读取参考体数据.
    pub fn load_reference(&self) -> FlexResult<Volume> {
        let path = self.reference_path();
        Volume::open(&path).map_err(|e| {
            if e.is_not_found() {
                FlexError::MissingInput(path)
            } else {
                e.into()
            }
        })
    }

    /// 读取降维嵌入.
    pub fn load_embedding(&self) -> FlexResult<Embedding> {
        Embedding::load(self.paths.output_matrix())
    }

    /// 光流样本数: 配置给出时使用配置, 否则为降维结果矩阵的行数.
    pub fn sample_count(&self) -> FlexResult<usize> {
        match self.config.sample_count {
            Some(n) => Ok(n),
            None => Ok(textmat::read_matrix(self.paths.output_matrix())?.nrows()),
        }
    }

    /// 确定逆映射方式.
    pub fn projector(&self) -> FlexResult<Projector> {
        Projector::resolve(
            &self.paths,
            self.config.method.as_deref(),
            self.config.rcond,
            self.config.condition_warn,
        )
    }

    /// 按缓存解析顺序获得光流矩阵伪逆.
    pub fn resolve_pinv(&self, sample_count: usize, reference: &Volume) -> FlexResult<ResolvedPinv> {
        let cache = FlowCache::new(self.paths.root(), self.config.cache_policy);
        let key = CacheKey::new(sample_count, reference.grid());
        let mut loader = DirFlowLoader::spider(self.flow_dir());
        cache.resolve_pinv(
            &key,
            &mut loader,
            self.config.rcond,
            self.config.condition_warn,
        )
    }

    /// 当前配置下的 ChimeraX 脚本.
    pub fn chimera_script(&self, name: &str) -> ChimeraScript {
        let v = &self.config.viewer;
        ChimeraScript {
            looping: v.looping,
            oscillate: v.oscillate,
            max_frame_rate: v.max_frame_rate,
            ..ChimeraScript::new(name)
        }
    }
}

/// 一次动画生成的结果.
#[derive(Debug, Clone)]
pub struct AnimationReport {
    /// 动画名.
    pub name: String,

    /// 重建方式.
    pub mode: ReconstructionMode,

    /// 伪逆来源.
    pub pinv_source: PinvSource,

    /// 按顺序写出的帧文件.
    pub frames: Vec<PathBuf>,

    /// 轨迹文件.
    pub trajectory: PathBuf,

    /// 查看器脚本.
    pub script: PathBuf,
}

fn check_name(name: &str) -> FlexResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(FlexError::InvalidInput(format!("invalid animation name `{name}`")));
    }
    Ok(())
}

/// 生成名为 `name` 的动画.
///
/// 1. 由轨迹点重建形变向量;
/// 2. 清空并重建 `animation_<name>` 目录, 保存轨迹;
/// 3. 获得光流矩阵伪逆 (缓存优先);
/// 4. 逐帧形变参考体数据并写出;
/// 5. 写出查看器脚本, 配置了查看器时启动它.
///
/// 任一步失败都会中止整个流水线.
pub fn run_animation(ctx: &RunContext, name: &str, trajectory: &Trajectory) -> FlexResult<AnimationReport> {
    check_name(name)?;
    let points = trajectory.as_matrix()?;
    let paths = ctx.paths();

    let projector = ctx.projector()?;
    let samples = if projector.is_exact() {
        None
    } else {
        Some(SampleTable::load(paths)?)
    };
    let recon = reconstruct::reconstruct_deformations(points.view(), &projector, samples.as_ref())?;
    drop(samples);

    let reference = ctx.load_reference()?;
    let sample_count = ctx.sample_count()?;
    if recon.deformations.ncols() != sample_count {
        return Err(FlexError::shape(
            "deformation length (flow bank samples)",
            sample_count,
            recon.deformations.ncols(),
        ));
    }

    animation::prepare_animation_dir(paths, name)?;
    let trajectory_path = paths.trajectory_path(name);
    trajectory.save(&trajectory_path)?;

    let pinv = ctx.resolve_pinv(sample_count, &reference)?;
    let pinv_source = pinv.source;
    let sequence = warp(ctx, &recon.deformations, &pinv, &reference)?;
    drop(pinv);

    let frames = sequence.write(paths, name)?;
    if ctx.config().previews {
        sequence.write_previews(paths, name)?;
    }
    log::info!("{} frames written to `{}`", frames.len(), paths.animation_dir(name).display());

    let script = paths.chimera_script();
    ctx.chimera_script(name).write(&script)?;
    if let Some(command) = &ctx.config().viewer.command {
        animation::launch_viewer(command, &script)?;
    }

    Ok(AnimationReport {
        name: name.to_string(),
        mode: recon.mode,
        pinv_source,
        frames,
        trajectory: trajectory_path,
        script,
    })
}

fn warp(
    ctx: &RunContext,
    deformations: &ndarray::Array2<f64>,
    pinv: &ResolvedPinv,
    reference: &Volume,
) -> FlexResult<animation::DeformedVolumeSequence> {
    #[cfg(feature = "rayon")]
    {
        if ctx.config().parallel {
            return animation::par_warp_sequence(deformations.view(), pinv.matrix.view(), reference);
        }
    }
    #[cfg(not(feature = "rayon"))]
    let _ = ctx;

    animation::warp_sequence(deformations.view(), pinv.matrix.view(), reference)
}

/// 由控制点生成轨迹并生成动画. 点数由配置给出.
pub fn run_animation_from_control(
    ctx: &RunContext,
    name: &str,
    control: ndarray::ArrayView2<f64>,
) -> FlexResult<AnimationReport> {
    let trajectory = Trajectory::from_control_points(control, ctx.config().trajectory_points)?;
    run_animation(ctx, name, &trajectory)
}

/// 读取已生成的动画 `name` 的轨迹.
///
/// 动画目录或轨迹文件不存在时返回 [`FlexError::MissingInput`].
pub fn load_animation(ctx: &RunContext, name: &str) -> FlexResult<Trajectory> {
    check_name(name)?;
    let path = ctx.paths().trajectory_path(name);
    if !path.is_file() {
        return Err(FlexError::MissingInput(path));
    }
    let trajectory = Trajectory::load(&path)?;
    log::info!("animation `{name}` loaded: {} points", trajectory.len());
    Ok(trajectory)
}

/// 将 `embedding` 中选中的样本编号写入 `cluster_<name>.txt`. 返回文件路径和个数.
pub fn create_cluster(ctx: &RunContext, name: &str, embedding: &Embedding) -> FlexResult<(PathBuf, usize)> {
    check_name(name)?;
    let path = ctx.paths().cluster_file(name);
    let n = embedding.write_selection(&path)?;
    log::info!("cluster `{name}`: {n} particles written to `{}`", path.display());
    Ok((path, n))
}
