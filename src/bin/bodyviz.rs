use std::path::{Path, PathBuf};

use anyhow::Context as _;
use bodyviz::{
    FsImageSource, HostLayout, Surface, VisualizerConfig, VisualizerController, VisualizerState,
};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bodyviz", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the avatar for one value as a PNG.
    Render(RenderArgs),
    /// Render one PNG per value over a range, reusing a single mount.
    Sweep(SweepArgs),
    /// Print the slider label, marker position and warp amount for a value.
    Label(LabelArgs),
}

#[derive(Args, Debug)]
struct SurfaceArgs {
    /// Directory holding the avatar files.
    #[arg(long)]
    assets: PathBuf,

    /// Optional JSON config; defaults apply to missing fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the asset base name from the config.
    #[arg(long)]
    base: Option<String>,

    /// Layout width in logical pixels.
    #[arg(long, default_value_t = 400.0)]
    width: f64,

    /// Layout height in logical pixels.
    #[arg(long, default_value_t = 600.0)]
    height: f64,

    /// Device pixel ratio.
    #[arg(long, default_value_t = 1.0)]
    dpr: f64,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    surface: SurfaceArgs,

    /// Body-fat percentage.
    #[arg(long)]
    value: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    surface: SurfaceArgs,

    #[arg(long, default_value_t = 5.0)]
    from: f64,

    #[arg(long, default_value_t = 45.0)]
    to: f64,

    #[arg(long, default_value_t = 5.0)]
    step: f64,

    /// Directory receiving `value_XX.png` files.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct LabelArgs {
    #[arg(long)]
    value: f64,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Sweep(args) => cmd_sweep(args),
        Command::Label(args) => cmd_label(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<VisualizerConfig> {
    match path {
        Some(p) => VisualizerConfig::from_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(VisualizerConfig::default()),
    }
}

fn mount(
    args: &SurfaceArgs,
    value: f64,
) -> anyhow::Result<VisualizerController<FsImageSource>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(base) = &args.base {
        config.asset.base = base.clone();
    }

    let mut viz = VisualizerController::new(config, FsImageSource::new(&args.assets))?;
    let layout = HostLayout::new(args.width, args.height, args.dpr);
    let state = pollster::block_on(viz.mount(layout, value, CancellationToken::new()))?;
    if state != VisualizerState::Ready {
        anyhow::bail!(
            "could not load avatar '{}' from '{}'",
            viz.config().asset.base,
            args.assets.display()
        );
    }
    Ok(viz)
}

fn write_png(surface: &Surface, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    surface
        .to_rgba_image()?
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", out.display()))?;
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let viz = mount(&args.surface, args.value)?;
    let surface = viz
        .surface()
        .context("surface is empty; check --width/--height")?;
    write_png(surface, &args.out)?;

    let p = viz.presentation();
    eprintln!(
        "wrote {} ({}x{}, {} at {:.1}%)",
        args.out.display(),
        surface.width(),
        surface.height(),
        p.label,
        p.marker_percent
    );
    Ok(())
}

fn cmd_sweep(args: SweepArgs) -> anyhow::Result<()> {
    if !(args.step.is_finite() && args.step > 0.0) {
        anyhow::bail!("--step must be > 0");
    }
    let mut viz = mount(&args.surface, args.from)?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;

    let mut value = args.from;
    while value <= args.to + 1e-9 {
        viz.on_value_change(value);
        let surface = viz
            .surface()
            .context("surface is empty; check --width/--height")?;
        let out = args.out_dir.join(format!("value_{value:05.1}.png"));
        write_png(surface, &out)?;
        eprintln!("wrote {} ({})", out.display(), viz.presentation().label);
        value += args.step;
    }
    Ok(())
}

fn cmd_label(args: LabelArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    println!("label:  {}", bodyviz::label_for(args.value));
    println!(
        "marker: {:.1}%",
        bodyviz::marker_percent(args.value, &config.slider)
    );
    println!("amount: {:.4}", bodyviz::value_to_amount(args.value));
    Ok(())
}
