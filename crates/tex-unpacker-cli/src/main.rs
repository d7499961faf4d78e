use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use tex_unpacker_core::{
    ExtractOptions, FrameStatus, OutputFormat, PVRTEXTOOL_ENV, extract, probe, probe_to_json,
    summary_to_json,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "tex-unpacker",
    about = "Split texture atlases back into individual sprites",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract every frame of an atlas into its own image
    Extract(ExtractArgs),
    /// Print what an atlas contains (JSON) without writing anything
    Probe(ProbeArgs),
}

#[derive(Parser, Debug, Clone)]
struct ExtractArgs {
    // Input/Output
    /// Atlas descriptor (.plist)
    #[arg(help_heading = "Input/Output")]
    descriptor: PathBuf,
    /// Output directory [default: unpacked/ next to the descriptor]
    #[arg(short, long, help_heading = "Input/Output")]
    out_dir: Option<PathBuf>,
    /// Texture file to use instead of the one named by the descriptor
    #[arg(long, help_heading = "Input/Output")]
    texture: Option<PathBuf>,
    /// YAML config file with extraction options (flags given here take precedence)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,

    // Output files
    /// String appended to every output file stem (e.g. @2x)
    #[arg(long, help_heading = "Output")]
    suffix: Option<String>,
    /// Image format: png | jpeg | bmp | tiff
    #[arg(long, value_parser = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"], help_heading = "Output")]
    format: Option<String>,
    /// Keep existing output files untouched
    #[arg(long, default_value_t = false, help_heading = "Output")]
    skip_existing: bool,

    // Processing
    /// PVRTexToolCLI binary for PVRTC/ETC textures
    #[arg(long, env = PVRTEXTOOL_ENV, help_heading = "Processing")]
    pvrtextool: Option<PathBuf>,
    /// Reconstruct frames in parallel (requires core feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Processing")]
    parallel: bool,
    /// Stop at the first frame that cannot be extracted
    #[arg(long, default_value_t = false, help_heading = "Processing")]
    fail_fast: bool,

    // Reporting
    /// Write a JSON summary of the run to this file
    #[arg(long, help_heading = "Reporting")]
    summary: Option<PathBuf>,
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Reporting")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Reporting")]
    print_config_format: String,
}

#[derive(Parser, Debug, Clone)]
struct ProbeArgs {
    /// Atlas descriptor (.plist)
    descriptor: PathBuf,
    /// Texture file to inspect instead of the one named by the descriptor
    #[arg(long)]
    texture: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Extract(args) => run_extract(args, cli.progress && !cli.quiet),
        Commands::Probe(args) => run_probe(args),
    }
}

fn run_extract(cli: &ExtractArgs, show_progress: bool) -> anyhow::Result<()> {
    let opts = build_options(cli)?;
    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&opts)?),
            _ => println!("{}", serde_json::to_string_pretty(&opts)?),
        }
        return Ok(());
    }
    if opts.parallel && !cfg!(feature = "parallel") {
        warn!("--parallel has no effect; rebuild with `--features parallel`");
    }

    let bar = show_progress.then(new_progress_bar);
    let summary = extract(&cli.descriptor, &opts, |p| {
        if let Some(b) = &bar {
            b.set_length(p.total as u64);
            b.set_message(p.name.to_string());
            b.inc(1);
        }
        if let FrameStatus::Failed { reason } = p.status {
            error!(frame = p.name, %reason, "frame failed");
        }
    })
    .with_context(|| format!("extract {}", cli.descriptor.display()))?;
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    info!(
        out_dir = ?summary.output_dir,
        texture = ?summary.texture_path,
        "{}",
        summary.summary()
    );
    if let Some(path) = &cli.summary {
        let text = serde_json::to_string_pretty(&summary_to_json(&summary))?;
        fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
        info!(?path, "summary written");
    }
    if summary.failed() > 0 {
        bail!(
            "{} of {} frames failed",
            summary.failed(),
            summary.frames.len()
        );
    }
    Ok(())
}

fn run_probe(cli: &ProbeArgs) -> anyhow::Result<()> {
    let report = probe(&cli.descriptor, cli.texture.as_deref())
        .with_context(|| format!("probe {}", cli.descriptor.display()))?;
    println!("{}", serde_json::to_string_pretty(&probe_to_json(&report))?);
    Ok(())
}

/// YAML config first, then any flag given on the command line.
fn build_options(cli: &ExtractArgs) -> anyhow::Result<ExtractOptions> {
    let mut opts = match &cli.config {
        Some(path) => {
            let file = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_yaml::from_str::<ExtractOptions>(&file)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => ExtractOptions::default(),
    };
    if let Some(v) = &cli.out_dir {
        opts.output_dir = Some(v.clone());
    }
    if let Some(v) = &cli.texture {
        opts.texture = Some(v.clone());
    }
    if let Some(v) = &cli.suffix {
        opts.suffix = v.clone();
    }
    if let Some(v) = &cli.format {
        opts.format = v
            .parse::<OutputFormat>()
            .map_err(|_| anyhow::anyhow!("unknown output format '{v}'"))?;
    }
    if let Some(v) = &cli.pvrtextool {
        opts.pvrtextool = Some(v.clone());
    }
    opts.skip_existing |= cli.skip_existing;
    opts.parallel |= cli.parallel;
    opts.fail_fast |= cli.fail_fast;
    opts.validate()?;
    Ok(opts)
}

fn new_progress_bar() -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};
    let b = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} extracting {pos}/{len} [{elapsed_precise}] {wide_msg}",
    ) {
        b.set_style(style);
    }
    b
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}
