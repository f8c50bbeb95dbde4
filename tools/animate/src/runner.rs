//! 程序运行函数.

use anyhow::{bail, Context};
use flex_berry::animation::launch_viewer;
use flex_berry::dataset::textmat;
use flex_berry::pipeline::{create_cluster, run_animation_from_control};
use flex_berry::prelude::*;
use utils::loader;

use crate::result::{AnimationSummary, AxisSummary};
use crate::{AnimateArgs, Cli, ClusterArgs, Command, HistArgs, ReplayArgs};

/// 实际运行.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let run_dir = match cli.run_dir {
        Some(d) => d,
        None => loader::run_dir_from_env_or_home()
            .context("cannot determine the run directory; pass --run-dir")?,
    };
    if !run_dir.is_dir() {
        bail!("run directory `{}` does not exist", run_dir.display());
    }

    let config = loader::config_or_default(cli.config.as_ref())
        .with_context(|| format!("loading config {:?}", cli.config))?;
    let ctx = RunContext::new(&run_dir, config)?;
    log::debug!("run directory `{}`, {} cpus", run_dir.display(), utils::cpus());

    match cli.command {
        Command::Animate(args) => animate(&ctx, args),
        Command::Hist(args) => hist(&ctx, args),
        Command::Cluster(args) => cluster(&ctx, args),
        Command::Replay(args) => replay(&ctx, args),
    }
}

fn with_viewer(ctx: &RunContext, viewer: Option<String>) -> anyhow::Result<RunContext> {
    let mut config = ctx.config().clone();
    if viewer.is_some() {
        config.viewer.command = viewer;
    }
    Ok(RunContext::new(ctx.paths().root(), config)?)
}

fn animate(ctx: &RunContext, args: AnimateArgs) -> anyhow::Result<()> {
    let ctx = with_viewer(ctx, args.viewer)?;
    let report = match (&args.points, &args.control) {
        (Some(points), _) => {
            let trajectory = Trajectory::load(points)
                .with_context(|| format!("reading trajectory `{}`", points.display()))?;
            run_animation(&ctx, &args.name, &trajectory)
        }
        (None, Some(control)) => {
            let control = textmat::read_matrix(control)
                .with_context(|| format!("reading control points `{}`", control.display()))?;
            run_animation_from_control(&ctx, &args.name, control.view())
        }
        (None, None) => bail!("either --points or --control is required"),
    }
    .with_context(|| format!("generating animation `{}`", args.name))?;

    AnimationSummary::from(&report).print()?;
    Ok(())
}

fn hist(ctx: &RunContext, args: HistArgs) -> anyhow::Result<()> {
    let embedding = ctx.load_embedding()?;
    let axes = parse_axes(&args.axes, embedding.dim())?;
    let bins = args.bins.unwrap_or(ctx.config().histogram_bins);

    let summary = if axes.len() == 1 {
        let axis = axes[0];
        AxisSummary::Histogram {
            axis,
            histogram: Histogram::new(embedding.column(axis), bins)?,
        }
    } else {
        AxisSummary::Scatter {
            data: embedding.scatter(&axes)?,
            axes,
        }
    };
    summary.print()?;
    Ok(())
}

fn cluster(ctx: &RunContext, args: ClusterArgs) -> anyhow::Result<()> {
    let mut embedding = ctx.load_embedding()?;
    if !args.ids.is_empty() {
        embedding.select_ids(&args.ids)?;
    }
    if let (Some(centre), Some(radius)) = (&args.centre, args.radius) {
        let centre = centre
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("bad centre `{centre}`"))?;
        embedding.select_within(&centre, radius)?;
    }

    let (path, n) = create_cluster(ctx, &args.name, &embedding)?;
    println!("{n} particles written to `{}`", path.display());
    Ok(())
}

fn replay(ctx: &RunContext, args: ReplayArgs) -> anyhow::Result<()> {
    let trajectory = load_animation(ctx, &args.name)?;
    utils::sep();
    println!("Animation `{}`: {} points", args.name, trajectory.len());
    for p in trajectory.points() {
        println!("    #{:<4} {}", p.id, p.coords);
    }
    utils::sep();

    let ctx = with_viewer(ctx, args.viewer)?;
    let script = ctx.paths().chimera_script();
    ctx.chimera_script(&args.name).write(&script)?;
    if let Some(command) = &ctx.config().viewer.command {
        launch_viewer(command, &script)?;
    }
    Ok(())
}
