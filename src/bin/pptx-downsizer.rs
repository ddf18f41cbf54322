//! CLI binary for pptx-downsizer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DownsizeConfig` and prints the report.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use pptx_downsizer::{
    downsize, inspect, parse_size, ArchiveCompression, ColorMode, DownsizeConfig,
    DownsizeProgressCallback, DownsizeReport, ExistingOutput, FillColor, OnError, PackageSummary,
    ProgressCallback, TargetFormat,
};
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn kb(bytes: u64) -> String {
    format!("{} kb", bytes / 1024)
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and one log line
/// per image. Images may complete out of order when `--concurrency` > 1.
///
/// Also owns the `--wait-before-zip` pause, so it is installed whenever that
/// flag is given, with a hidden bar if progress output is off.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
    wait_before_zip: bool,
}

impl CliProgressCallback {
    fn new(show_progress: bool, wait_before_zip: bool) -> Arc<Self> {
        let bar = if show_progress {
            let bar = ProgressBar::new(0);
            let spinner_style =
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS);
            bar.set_style(spinner_style);
            bar.set_prefix("Preparing");
            bar.set_message("Extracting presentation…");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
            wait_before_zip,
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    /// Start times are keyed on the stem so a renamed image still finds its entry.
    fn key(name: &str) -> String {
        name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string()
    }

    fn elapsed(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&Self::key(name)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl DownsizeProgressCallback for CliProgressCallback {
    fn on_run_start(&self, selected: usize, total: usize) {
        self.activate_bar(selected);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {selected} of {total} images…"))
        ));
    }

    fn on_image_start(&self, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(Self::key(name), Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_image_complete(&self, name: &str, old_size: u64, new_size: u64) {
        let secs = self.elapsed(name);
        self.bar.println(format!(
            "  {} {:<24} {:>10} → {:<10} {}",
            green("✓"),
            name,
            dim(&kb(old_size)),
            kb(new_size),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, name: &str, error: &str) {
        let secs = self.elapsed(name);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<24} {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_before_pack(&self, workspace: &Path) {
        if !self.wait_before_zip {
            self.bar.set_prefix("Packing");
            return;
        }
        self.bar.suspend(|| {
            eprintln!(
                "\n{}\n\
                 You can make manual changes before the archive is built.\n\
                 The unpacked presentation is in:\n    {}\n",
                bold("WAITING BEFORE ZIP (--wait-before-zip)"),
                workspace.display()
            );
            eprint!("Press enter to continue...");
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
        });
        self.bar.set_prefix("Packing");
    }

    fn on_run_complete(&self, selected: usize, converted: usize) {
        let failed = selected.saturating_sub(converted);
        self.bar.finish_and_clear();
        if self.bar.is_hidden() {
            return;
        }
        if failed == 0 {
            eprintln!(
                "{} {} images converted successfully",
                green("✔"),
                bold(&converted.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images converted  ({} failed)",
                if failed == selected { red("✘") } else { cyan("⚠") },
                bold(&converted.to_string()),
                selected,
                red(&self.errors.load(Ordering::SeqCst).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default: images over 512 KiB become PNG, at most 2048 px per side
  pptx-downsizer talk.pptx

  # Photos: convert to JPEG at quality 80
  pptx-downsizer --convert-to jpeg --quality 80 talk.pptx

  # Only TIFF images, whatever their size
  pptx-downsizer --name-filter '*.tiff' --size-filter none talk.pptx

  # Keep pixel dimensions, only re-encode
  pptx-downsizer --max-dimension 0 talk.pptx

  # Flatten transparency onto white before saving as RGB
  pptx-downsizer --color-mode RGB --fill-color white talk.pptx

  # Write next to the input with a custom name, replacing it if present
  pptx-downsizer --output-format '{fnroot}-small.pptx' --overwrite talk.pptx

  # List embedded images without changing anything
  pptx-downsizer --inspect-only talk.pptx

  # Machine-readable report
  pptx-downsizer --json talk.pptx > report.json

SIZES:
  Plain bytes (1000000, 1e6) or with a binary suffix: 500kb, 2MB, 1.5m.

OUTPUT NAME PLACEHOLDERS:
  {filename}  the input path as given          talk.pptx
  {fnroot}    the input path minus extension   talk

ENVIRONMENT VARIABLES:
  Every option can be set with PPTX_DOWNSIZER_<OPTION>, for example
  PPTX_DOWNSIZER_CONVERT_TO=jpeg or PPTX_DOWNSIZER_SIZE_FILTER=1mb.
  RUST_LOG overrides the log level derived from -v / -q.
"#;

/// Reduce the file size of PowerPoint presentations by re-compressing the
/// images inside them.
#[derive(Parser, Debug)]
#[command(
    name = "pptx-downsizer",
    version,
    about = "Reduce the file size of PowerPoint presentations by re-compressing embedded images",
    long_about = "Unpacks a .pptx, downscales and re-encodes every embedded image that passes \
the size and name filters, points the slides at the converted files and packs a new \
presentation next to the original.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the .pptx file to downsize.
    input: PathBuf,

    /// Only convert images whose name matches this glob, e.g. '*.tiff'.
    #[arg(long, env = "PPTX_DOWNSIZER_NAME_FILTER", value_name = "GLOB")]
    name_filter: Option<String>,

    /// Only convert images larger than this ('none' converts every size).
    #[arg(
        long,
        env = "PPTX_DOWNSIZER_SIZE_FILTER",
        value_name = "SIZE",
        default_value = "512kb"
    )]
    size_filter: String,

    /// Downscale images whose width or height exceeds this (0 disables).
    #[arg(
        long,
        env = "PPTX_DOWNSIZER_MAX_DIMENSION",
        value_name = "PX",
        default_value_t = 2048
    )]
    max_dimension: u32,

    /// Target format: png, jpeg, gif, bmp, tiff. JPEG sources stay JPEG.
    #[arg(long, env = "PPTX_DOWNSIZER_CONVERT_TO", value_name = "FORMAT", default_value = "png")]
    convert_to: String,

    /// JPEG quality (1–100).
    #[arg(long, env = "PPTX_DOWNSIZER_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Use faster, larger PNG compression.
    #[arg(long, env = "PPTX_DOWNSIZER_NO_OPTIMIZE")]
    no_optimize: bool,

    /// Convert images to this mode before saving: L, LA, RGB, RGBA.
    #[arg(long, env = "PPTX_DOWNSIZER_COLOR_MODE", value_name = "MODE")]
    color_mode: Option<String>,

    /// Background for transparent regions when changing mode: #rgb, #rrggbb, white, black.
    #[arg(long, env = "PPTX_DOWNSIZER_FILL_COLOR", value_name = "COLOR")]
    fill_color: Option<String>,

    /// Output file name; supports {filename} and {fnroot}.
    #[arg(
        long,
        env = "PPTX_DOWNSIZER_OUTPUT_FORMAT",
        value_name = "FORMAT",
        default_value = pptx_downsizer::config::DEFAULT_OUTPUT_NAME_FORMAT
    )]
    output_format: String,

    /// Zip compression: stored, deflated, bzip2, zstd.
    #[arg(long, env = "PPTX_DOWNSIZER_COMPRESSION", value_name = "METHOD", default_value = "deflated")]
    compression: String,

    /// Replace the output file if it already exists.
    #[arg(long, env = "PPTX_DOWNSIZER_OVERWRITE")]
    overwrite: bool,

    /// What to do when an image fails: raise or continue.
    #[arg(long, env = "PPTX_DOWNSIZER_ON_ERROR", value_name = "POLICY", default_value = "raise")]
    on_error: String,

    /// Number of images converted at the same time.
    #[arg(short, long, env = "PPTX_DOWNSIZER_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Pause after conversion so the unpacked files can be edited by hand.
    #[arg(long, env = "PPTX_DOWNSIZER_WAIT_BEFORE_ZIP")]
    wait_before_zip: bool,

    /// List embedded images only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print the report (or inspection) as JSON on stdout.
    #[arg(long, env = "PPTX_DOWNSIZER_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PPTX_DOWNSIZER_NO_PROGRESS")]
    no_progress: bool,

    /// More output; repeat for more (-vvv is the most).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PPTX_DOWNSIZER_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Verbosity on the 0–5 scale used by the library.
    fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            (2 + self.verbose).min(5)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already shows per-image lines, so library INFO logs
    // are only shown without it or when asked for with -v.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = match verbosity {
        0 => "error",
        1 => "warn",
        2 if show_progress || cli.json => "warn",
        2 => "info",
        3 => "info,pptx_downsizer=debug",
        4 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect(&cli.input)
            .await
            .context("Failed to inspect presentation")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            print_summary(&summary);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress || cli.wait_before_zip {
        let cb = CliProgressCallback::new(show_progress, cli.wait_before_zip);
        Some(cb as Arc<dyn DownsizeProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, verbosity, progress_cb)?;

    if verbosity > 0 && !cli.json {
        let size = std::fs::metadata(&cli.input).map(|m| m.len()).unwrap_or(0);
        eprintln!(
            "{} Downsizing {} ({:.1} MB)",
            cyan("◆"),
            bold(&cli.input.display().to_string()),
            size as f64 / (1u64 << 20) as f64
        );
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = downsize(&cli.input, &config)
        .await
        .with_context(|| format!("Failed to downsize {}", cli.input.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if verbosity > 0 {
        print_report(&report, verbosity);
        if config.convert_to == TargetFormat::Png {
            eprintln!("\n{}", dim(PNG_HINT));
        }
    }

    Ok(())
}

const PNG_HINT: &str = "Notice: images were converted to PNG (the default). PNG keeps the \
appearance of screenshots and diagrams intact,\nbut photographs and other finely detailed \
pictures can stay large. If some images above are still too big,\ntry again with \
`--convert-to jpeg`.";

/// Map CLI args to `DownsizeConfig`.
fn build_config(
    cli: &Cli,
    verbosity: u8,
    progress: Option<ProgressCallback>,
) -> Result<DownsizeConfig> {
    let mut builder = DownsizeConfig::builder()
        .convert_to(cli.convert_to.parse::<TargetFormat>()?)
        .quality(cli.quality)
        .optimize(!cli.no_optimize)
        .output_name_format(cli.output_format.clone())
        .compression(cli.compression.parse::<ArchiveCompression>()?)
        .existing_output(if cli.overwrite {
            ExistingOutput::Overwrite
        } else {
            ExistingOutput::Abort
        })
        .on_error(cli.on_error.parse::<OnError>()?)
        .verbosity(verbosity)
        .concurrency(cli.concurrency as usize);

    builder = match parse_size_filter(&cli.size_filter)? {
        Some(bytes) => builder.size_filter(bytes),
        None => builder.no_size_filter(),
    };
    builder = match cli.max_dimension {
        0 => builder.no_max_dimension(),
        px => builder.max_dimension(px),
    };
    if let Some(ref glob) = cli.name_filter {
        builder = builder.name_filter(glob.clone());
    }
    if let Some(ref mode) = cli.color_mode {
        builder = builder.color_mode(mode.parse::<ColorMode>()?);
    }
    if let Some(ref color) = cli.fill_color {
        builder = builder.fill_color(color.parse::<FillColor>()?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--size-filter`; `none`, `off` and `0` disable the filter.
fn parse_size_filter(s: &str) -> Result<Option<u64>> {
    match s.trim().to_ascii_lowercase().as_str() {
        "none" | "off" | "" => Ok(None),
        other => {
            let bytes = parse_size(other)?;
            Ok((bytes > 0).then_some(bytes))
        }
    }
}

fn print_summary(summary: &PackageSummary) {
    println!("File:          {}", summary.path.display());
    println!("Size:          {}", kb(summary.size));
    println!("Entries:       {}", summary.entry_count);
    println!("Relationships: {}", summary.rels_count);
    println!(
        "Images:        {} ({} total)",
        summary.media.len(),
        kb(summary.media_bytes())
    );
    for m in &summary.media {
        let dims = m
            .dimensions
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<24} {:>10}  {}", m.name, kb(m.size), dims);
    }
}

fn print_report(report: &DownsizeReport, verbosity: u8) {
    let stats = &report.stats;
    if verbosity > 2 || !report.media.is_empty() {
        println!();
        for m in &report.media {
            let status = match &m.error {
                None => green("✓"),
                Some(_) => red("✗"),
            };
            let resized = m
                .resized
                .map(|((w, h), (nw, nh))| format!("  {w}x{h} → {nw}x{nh}"))
                .unwrap_or_default();
            println!(
                "{} {:<24} {:>10} → {:<10}{}",
                status,
                m.name,
                kb(m.original_size),
                kb(m.new_size),
                dim(&resized)
            );
            if let Some(ref e) = m.error {
                println!("    {}", red(&e.to_string()));
            }
        }
    }
    if !report.renames.is_empty() && verbosity > 1 {
        println!("\nChanged image filenames:");
        for r in &report.renames {
            println!("  {} -> {}", r.old_name, r.new_name);
        }
    }
    println!(
        "\n{} New file: {}  {:.1} MB ({:.1} % of original size)  {}ms",
        if stats.failed_images == 0 { green("✔") } else { cyan("⚠") },
        bold(&report.output_path.display().to_string()),
        stats.output_size as f64 / (1u64 << 20) as f64,
        stats.ratio() * 100.0,
        stats.total_duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_filter_none_disables() {
        assert_eq!(parse_size_filter("none").unwrap(), None);
        assert_eq!(parse_size_filter("0").unwrap(), None);
        assert_eq!(parse_size_filter("1mb").unwrap(), Some(1 << 20));
    }

    #[test]
    fn verbosity_scale() {
        let cli = Cli::parse_from(["pptx-downsizer", "deck.pptx"]);
        assert_eq!(cli.verbosity(), 2);
        let cli = Cli::parse_from(["pptx-downsizer", "-vvvvv", "deck.pptx"]);
        assert_eq!(cli.verbosity(), 5);
        let cli = Cli::parse_from(["pptx-downsizer", "-q", "deck.pptx"]);
        assert_eq!(cli.verbosity(), 0);
    }

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "pptx-downsizer",
            "--convert-to",
            "jpg",
            "--size-filter",
            "none",
            "--max-dimension",
            "0",
            "--overwrite",
            "--on-error",
            "continue",
            "deck.pptx",
        ]);
        let config = build_config(&cli, cli.verbosity(), None).unwrap();
        assert_eq!(config.convert_to, TargetFormat::Jpeg);
        assert_eq!(config.size_filter, None);
        assert_eq!(config.max_dimension, None);
        assert_eq!(config.existing_output, ExistingOutput::Overwrite);
        assert_eq!(config.on_error, OnError::Continue);
    }

    #[test]
    fn bad_format_is_rejected() {
        let cli = Cli::parse_from(["pptx-downsizer", "--convert-to", "webp", "deck.pptx"]);
        assert!(build_config(&cli, 2, None).is_err());
    }
}
