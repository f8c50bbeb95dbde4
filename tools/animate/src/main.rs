//! 轨迹动画命令行工具.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod result;
mod runner;

/// 将降维空间中的轨迹还原为参考体数据的形变动画.
#[derive(Debug, Parser)]
#[command(name = "animate", version)]
pub struct Cli {
    /// 运行目录. 默认为 `$FLEX_RUN_DIR` 或 `$HOME/flexdata/run`.
    #[arg(long, global = true)]
    pub run_dir: Option<PathBuf>,

    /// JSON 配置文件.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 提高日志级别, 可重复.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// 子命令.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// 生成动画.
    Animate(AnimateArgs),

    /// 打印降维坐标的直方图 (1 个坐标轴) 或散点数据 (2 至 3 个坐标轴).
    Hist(HistArgs),

    /// 选择样本并写出聚类文件.
    Cluster(ClusterArgs),

    /// 重新加载已生成的动画.
    Replay(ReplayArgs),
}

/// `animate` 参数.
#[derive(Debug, Args)]
pub struct AnimateArgs {
    /// 动画名.
    #[arg(long)]
    pub name: String,

    /// 轨迹点文本矩阵 `[T, d]`, 逐点使用.
    #[arg(long, conflicts_with = "control", required_unless_present = "control")]
    pub points: Option<PathBuf>,

    /// 控制点文本矩阵, 按弧长重采样为配置给出的点数.
    #[arg(long)]
    pub control: Option<PathBuf>,

    /// 生成后用该命令打开查看器脚本.
    #[arg(long)]
    pub viewer: Option<String>,
}

/// `hist` 参数.
#[derive(Debug, Args)]
pub struct HistArgs {
    /// 坐标轴列表, 从 1 开始, 如 `"1 2"`.
    #[arg(long, default_value = "1")]
    pub axes: String,

    /// 直方图区间数. 默认使用配置.
    #[arg(long)]
    pub bins: Option<usize>,
}

/// `cluster` 参数.
#[derive(Debug, Args)]
pub struct ClusterArgs {
    /// 聚类名.
    #[arg(long)]
    pub name: String,

    /// 按编号选择, 逗号分隔.
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u32>,

    /// 按半径选择时的中心坐标, 空白分隔.
    #[arg(long, requires = "radius")]
    pub centre: Option<String>,

    /// 选择半径.
    #[arg(long, requires = "centre")]
    pub radius: Option<f64>,
}

/// `replay` 参数.
#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// 动画名.
    #[arg(long)]
    pub name: String,

    /// 用该命令打开查看器脚本.
    #[arg(long)]
    pub viewer: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("cannot initialise logger")?;

    runner::run(cli)
}
