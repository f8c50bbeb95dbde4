//! 运行结果.

use std::io::{self, Write};

use flex_berry::flow::PinvSource;
use flex_berry::pipeline::AnimationReport;
use flex_berry::prelude::*;
use ndarray::Array2;

const S4: &str = "    ";

/// 动画生成结果摘要.
pub struct AnimationSummary<'a> {
    report: &'a AnimationReport,
}

impl<'a> From<&'a AnimationReport> for AnimationSummary<'a> {
    fn from(report: &'a AnimationReport) -> Self {
        Self { report }
    }
}

impl AnimationSummary<'_> {
    /// 将摘要写进 `w` 中.
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let r = self.report;
        let source = match r.pinv_source {
            PinvSource::Cached => "cached pseudo-inverse",
            PinvSource::CachedBank => "cached flow bank",
            PinvSource::Built => "optical flow files",
        };

        writeln!(w, "Animation `{}`:", r.name)?;
        writeln!(w, "{S4}Mode: {}", r.mode)?;
        writeln!(w, "{S4}Flow pseudo-inverse from: {source}")?;
        writeln!(w, "{S4}Frames: {}", r.frames.len())?;
        if let (Some(first), Some(last)) = (r.frames.first(), r.frames.last()) {
            writeln!(w, "{S4}First frame: {}", first.display())?;
            writeln!(w, "{S4}Last frame: {}", last.display())?;
        }
        writeln!(w, "{S4}Trajectory: {}", r.trajectory.display())?;
        write!(w, "{S4}Viewer script: {}", r.script.display())?;
        Ok(())
    }

    /// 打印摘要.
    pub fn print(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        utils::sep_to(&mut out)?;
        self.describe_into(&mut out)?;
        writeln!(out)?;
        utils::sep_to(&mut out)
    }
}

/// 坐标轴数据摘要.
pub enum AxisSummary {
    /// 单个坐标轴的直方图.
    Histogram {
        /// 坐标轴, 从 0 开始.
        axis: usize,
        /// 直方图.
        histogram: Histogram,
    },

    /// 2 至 3 个坐标轴的散点数据.
    Scatter {
        /// 坐标轴, 从 0 开始.
        axes: Vec<usize>,
        /// `[N, axes.len()]`.
        data: Array2<f64>,
    },
}

impl AxisSummary {
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Histogram { axis, histogram } => {
                const WIDTH: usize = 40;
                let peak = histogram.counts.iter().copied().max().unwrap_or(0).max(1);
                writeln!(w, "Histogram of reduced dimension {}:", axis + 1)?;
                for (i, &c) in histogram.counts.iter().enumerate() {
                    let bar = "#".repeat(c * WIDTH / peak);
                    writeln!(
                        w,
                        "{S4}[{:>12.6}, {:>12.6}) {:>6} {bar}",
                        histogram.edges[i],
                        histogram.edges[i + 1],
                        c
                    )?;
                }
                write!(w, "{S4}Total: {}", histogram.total())
            }
            Self::Scatter { axes, data } => {
                let names: Vec<String> = axes.iter().map(|a| format!("axis {}", a + 1)).collect();
                writeln!(w, "# id {}", names.join(" "))?;
                for (i, row) in data.rows().into_iter().enumerate() {
                    write!(w, "{}", i + 1)?;
                    for v in row {
                        write!(w, " {v:.6}")?;
                    }
                    writeln!(w)?;
                }
                Ok(())
            }
        }
    }

    /// 打印.
    pub fn print(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        self.describe_into(&mut out)?;
        writeln!(out)
    }
}
