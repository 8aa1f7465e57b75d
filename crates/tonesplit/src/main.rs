//! tonesplit: split a photograph into four tonal reference layers.
//!
//! Reads an image file, derives brightness thresholds from its own
//! distribution, and writes one JPEG per tonal range (highlights,
//! midtones, shadows, darks) next to the source or into `--output-dir`.
//! Progress goes to stderr; a timing report (or JSON) goes to stdout.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tonesplit -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tonesplit_pipeline::diagnostics::{Clock, DiagnosticsRecorder};
use tonesplit_pipeline::{EngineConfig, ProgressObserver, RenderStrategy, SourceLimits, StageEvent};

/// Split a photograph into highlights, midtones, shadows, and darks.
///
/// Thresholds come from the 25th and 75th brightness percentiles of the
/// image itself, so every photo is divided into comparable layers.
#[derive(Parser)]
#[command(name = "tonesplit", version)]
struct Cli {
    /// Path to the input image (JPEG, PNG, GIF, WebP).
    image_path: PathBuf,

    /// Directory for the output JPEGs (defaults to the image's directory).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// How the four range images are rendered.
    #[arg(long, value_enum, default_value_t = Strategy::FourPass)]
    strategy: Strategy,

    /// Maximum accepted source size in MiB.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_size_mb: Option<usize>,

    /// Full engine config as a JSON string.
    ///
    /// When provided, `--strategy` and `--max-size-mb` are ignored.
    /// The JSON must be a valid `EngineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Suppress progress lines on stderr.
    #[arg(long)]
    quiet: bool,
}

/// Rendering strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// One full pass over the image per range.
    FourPass,
    /// A single pass filling all four ranges.
    Fused,
}

/// Build an [`EngineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<EngineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let limits = cli
        .max_size_mb
        .map_or_else(SourceLimits::default, |mb| SourceLimits {
            max_bytes: mb.saturating_mul(1024 * 1024),
        });

    Ok(EngineConfig {
        render_strategy: match cli.strategy {
            Strategy::FourPass => RenderStrategy::FourPass,
            Strategy::Fused => RenderStrategy::Fused,
        },
        limits,
    })
}

/// Where output files go: `--output-dir`, else the image's directory.
fn output_dir(cli: &Cli) -> PathBuf {
    cli.output_dir.clone().unwrap_or_else(|| {
        cli.image_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let file_name = cli
        .image_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if !cli.quiet {
        eprintln!(
            "Image: {} ({} bytes)",
            cli.image_path.display(),
            image_bytes.len(),
        );
        eprintln!("Config: {config:?}");
        eprintln!();
    }

    let clock = StdClock;
    let mut observer = CliObserver {
        recorder: DiagnosticsRecorder::new(&clock),
        quiet: cli.quiet,
    };

    let outcome = match tonesplit_pipeline::process(
        &image_bytes,
        file_name,
        &config,
        &tonesplit_export::JpegEncoder::default(),
        &mut observer,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let diagnostics = observer.recorder.finish();

    let out_dir = output_dir(&cli);
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("Error creating {}: {e}", out_dir.display());
        return ExitCode::FAILURE;
    }

    let mut failed = false;
    for processed in outcome.successes() {
        let path = out_dir.join(&processed.name);
        match std::fs::write(&path, &processed.artifact.bytes) {
            Ok(()) => {
                if !cli.quiet {
                    eprintln!(
                        "Wrote {} ({} bytes)",
                        path.display(),
                        processed.artifact.bytes.len(),
                    );
                }
            }
            Err(e) => {
                eprintln!("Error writing {}: {e}", path.display());
                failed = true;
            }
        }
    }
    for (range, result) in outcome.images.iter() {
        if let Err(e) = result {
            eprintln!("Error: {range} image failed: {e}");
            failed = true;
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", diagnostics.report());
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Records diagnostics and echoes each stage to stderr.
struct CliObserver<'a> {
    recorder: DiagnosticsRecorder<'a, StdClock>,
    quiet: bool,
}

impl ProgressObserver for CliObserver<'_> {
    fn on_event(&mut self, event: &StageEvent) {
        self.recorder.on_event(event);
        if !self.quiet {
            eprintln!("[{:>3.0}%] {}", event.progress(), event.label());
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tonesplit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let config = config_from_cli(&parse(&["photo.jpg"])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn flags_override_strategy_and_limit() {
        let config =
            config_from_cli(&parse(&["photo.jpg", "--strategy", "fused", "--max-size-mb", "2"]))
                .unwrap();
        assert_eq!(config.render_strategy, RenderStrategy::Fused);
        assert_eq!(config.limits.max_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn config_json_takes_precedence() {
        let cli = parse(&[
            "photo.jpg",
            "--strategy",
            "four-pass",
            "--config-json",
            r#"{"render_strategy":"Fused"}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.render_strategy, RenderStrategy::Fused);
        assert_eq!(config.limits, SourceLimits::default());
    }

    #[test]
    fn invalid_config_json_is_reported() {
        let cli = parse(&["photo.jpg", "--config-json", "{not json"]);
        let err = config_from_cli(&cli).unwrap_err();
        assert!(err.starts_with("Error parsing --config-json"), "{err}");
    }

    #[test]
    fn zero_size_limit_is_rejected_by_clap() {
        let result = Cli::try_parse_from(["tonesplit", "photo.jpg", "--max-size-mb", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn output_dir_defaults_to_image_directory() {
        assert_eq!(
            output_dir(&parse(&["shots/photo.jpg"])),
            PathBuf::from("shots")
        );
        assert_eq!(output_dir(&parse(&["photo.jpg"])), PathBuf::from("."));
        assert_eq!(
            output_dir(&parse(&["shots/photo.jpg", "--output-dir", "out"])),
            PathBuf::from("out")
        );
    }
}
