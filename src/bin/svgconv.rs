//! svgconv command-line interface.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use svgconv::{
    ConversionOptions, ConversionRequest, Format, Orchestrator, ProgressTracker, Registry,
    RegistryConfig, TurnPolicy,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "svgconv",
    version,
    about = "Convert raster images, PDFs, and SVGs between formats"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a single file
    Convert(ConvertArgs),
    /// Run the HTTP conversion API
    Serve(ServeArgs),
    /// List available converters
    List {
        /// Emit machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Input file
    input: PathBuf,

    /// Output file (defaults to the input name with the target extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target format (inferred from --output's extension when omitted)
    #[arg(short, long)]
    to: Option<Format>,

    /// Black/white luminance threshold for tracing (0-255)
    #[arg(long, default_value_t = 128)]
    threshold: u8,

    /// Trace each quantized color as its own layer
    #[arg(long)]
    color_mode: bool,

    /// Quantization levels per channel in color mode (2-16)
    #[arg(long, default_value_t = 4)]
    color_levels: u8,

    /// Path simplification aggressiveness (1-10)
    #[arg(long, default_value_t = 5)]
    optimization: u8,

    /// Ambiguous corner resolution: minority, majority, left, right, black, white
    #[arg(long, default_value_t = TurnPolicy::Minority)]
    turn_policy: TurnPolicy,

    /// Output quality for lossy raster targets (1-100)
    #[arg(long, default_value_t = 85)]
    quality: u8,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Stretch to exact dimensions instead of fitting within them
    #[arg(long)]
    no_preserve_aspect_ratio: bool,

    /// Background color for raster targets without alpha (#rrggbb)
    #[arg(long)]
    background: Option<String>,

    /// Page number for PDF input (1-based)
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Render scale for PDF pages (0.1-10.0)
    #[arg(long, default_value_t = 2.0)]
    scale: f32,

    /// Print result metadata as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "SVGCONV_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("svgconv=info")),
        )
        .init();

    let registry = Arc::new(Registry::builtin(RegistryConfig::default()));
    registry.validate().map_err(|e| anyhow!("{e}"))?;
    let orchestrator = Orchestrator::new(registry);

    match Cli::parse().command {
        Command::Convert(args) => run_convert(orchestrator, args).await,
        Command::Serve(args) => svgconv::http::serve(args.addr, orchestrator)
            .await
            .map_err(|e| anyhow!("{e}")),
        Command::List { json } => run_list(&orchestrator, json),
    }
}

async fn run_convert(orchestrator: Orchestrator, args: ConvertArgs) -> Result<()> {
    let input_name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .context("input path has no file name")?
        .to_owned();
    let from = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .and_then(Format::from_extension)
        .with_context(|| format!("cannot infer input format of '{input_name}'"))?;
    let to = resolve_target(&args, from)?;
    let slug = format!("{from}-to-{to}");

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let options = ConversionOptions {
        threshold: args.threshold,
        color_mode: args.color_mode,
        color_levels: args.color_levels,
        optimization: args.optimization,
        turn_policy: args.turn_policy,
        quality: args.quality,
        width: args.width,
        height: args.height,
        preserve_aspect_ratio: !args.no_preserve_aspect_ratio,
        background: args.background.clone(),
        page: args.page,
        scale: args.scale,
    };

    let tracker = Arc::new(ProgressTracker::start(bytes.len() as u64));
    let handle = {
        let orchestrator = orchestrator.clone();
        let tracker = tracker.clone();
        tokio::spawn(async move {
            orchestrator
                .convert_with_tracker(
                    &slug,
                    ConversionRequest {
                        file_name: input_name,
                        bytes,
                        options,
                    },
                    &tracker,
                )
                .await
        })
    };

    let bar = ProgressBar::new(100).with_style(
        ProgressStyle::with_template("{bar:30.cyan/dim} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    while !handle.is_finished() {
        let snap = tracker.snapshot();
        bar.set_position(u64::from(snap.progress));
        bar.set_message(snap.stage_label);
        tokio::time::sleep(Duration::from_millis(80)).await;
    }
    let result = handle.await.context("conversion task panicked")?;
    let conversion = match result {
        Ok(conversion) => conversion,
        Err(e) => {
            bar.abandon_with_message("failed");
            bail!("{e}");
        }
    };
    bar.finish_with_message("done");

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&conversion.suggested_filename));
    std::fs::write(&output, &conversion.data)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&conversion.metadata)?);
    } else {
        println!(
            "{} -> {} ({} bytes, {} via {}, {} ms)",
            args.input.display(),
            output.display(),
            conversion.size_bytes,
            conversion.mime_type,
            conversion.metadata.method,
            conversion.metadata.duration_ms,
        );
    }
    Ok(())
}

fn resolve_target(args: &ConvertArgs, from: Format) -> Result<Format> {
    if let Some(to) = args.to {
        return Ok(to);
    }
    if let Some(to) = args
        .output
        .as_ref()
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .and_then(Format::from_extension)
    {
        return Ok(to);
    }
    // Sensible defaults: everything vectorizes to SVG, SVG rasterizes to PNG.
    Ok(match from {
        Format::Svg => Format::Png,
        _ => Format::Svg,
    })
}

fn run_list(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let descriptors = orchestrator.registry().descriptors();
    if json {
        let all: Vec<_> = descriptors.iter().map(|d| d.schema_json()).collect();
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }
    println!("{:<14} {:>6} -> {:<5} {}", "CONVERTER", "FROM", "TO", "DESCRIPTION");
    for d in descriptors {
        println!("{:<14} {:>6} -> {:<5} {}", d.slug, d.from, d.to, d.description);
    }
    Ok(())
}
