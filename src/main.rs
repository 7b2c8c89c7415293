//! imgbatch - terminal front end for the image batch processing service.
//!
//! Drives the same command layer a desktop shell would: pick files, fill the
//! tool form, submit, follow progress and print the download link.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgbatch::commands::{self, ToolInput};
use imgbatch::files::{FileHandle, PendingFile, RawFileEntry};
use imgbatch::session::{
    JobState, OutputFormat, ResizeMode, ResizeParams, WatermarkParams, WatermarkPosition,
};
use imgbatch::surface::{Alert, AlertSink, EventSink, UiEvent};
use imgbatch::{AppState, ClientConfig};

/// Command-line arguments for imgbatch
#[derive(Parser, Debug)]
#[command(name = "imgbatch")]
#[command(about = "Submit image batches to the processing service")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "imgbatch.toml", env = "IMGBATCH_CONFIG")]
    config: PathBuf,

    /// Overrides `base_url` from the configuration file
    #[arg(long, env = "IMGBATCH_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert images to another format
    Convert(JobArgs),
    /// Resize images
    Resize {
        #[command(flatten)]
        job: JobArgs,
        #[arg(long, default_value = "fit")]
        mode: ResizeMode,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Required in percentage mode (1-1000)
        #[arg(long)]
        percentage: Option<u32>,
    },
    /// Stamp a text or image watermark
    Watermark {
        #[command(flatten)]
        job: JobArgs,
        #[arg(long, conflicts_with = "image")]
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long, default_value = "bottom_right")]
        position: WatermarkPosition,
        #[arg(long, default_value_t = 50)]
        opacity: u8,
        /// Percent of the image width
        #[arg(long, default_value_t = 30)]
        size: u8,
    },
    /// Write GPS and contact metadata
    Geotag {
        #[command(flatten)]
        job: JobArgs,
        #[arg(long)]
        country: Option<String>,
        /// State or province of the chosen country
        #[arg(long)]
        state: Option<String>,
        /// City preset ID
        #[arg(long)]
        city: Option<String>,
        /// Client preset ID used to prefill contact fields
        #[arg(long)]
        client: Option<String>,
        /// Capture time (RFC 3339) written as the GPS timestamp
        #[arg(long)]
        taken_at: Option<DateTime<Utc>>,
    },
    /// List presets
    Presets {
        #[command(subcommand)]
        family: PresetsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PresetsCommand {
    Cities,
    Clients,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Image files to submit
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format: jpeg, png or tiff
    #[arg(short, long, default_value = "jpeg")]
    format: OutputFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// Console Surface
// ─────────────────────────────────────────────────────────────────────────────

/// Prints progress, results and alerts to the terminal.
struct ConsoleSurface;

impl EventSink for ConsoleSurface {
    fn emit(&self, event: UiEvent) {
        match event {
            UiEvent::FileList { tool, view } => {
                for row in view.rows() {
                    println!("[{}] {} ({})", tool, row.path, row.size_label);
                }
            }
            UiEvent::JobProgress { tool, percent } => println!("[{}] {}%", tool, percent),
            UiEvent::JobSucceeded { tool, message, .. } => println!("[{}] {}", tool, message),
            other => debug!("[CLI] {:?}", other),
        }
    }
}

impl AlertSink for ConsoleSurface {
    fn alert(&self, alert: Alert) {
        eprintln!("{}: {}", alert.title, alert.message);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgbatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    info!("[CLI] Using backend {}", config.base_url);

    let surface = Arc::new(ConsoleSurface);
    let state = AppState::new(config, surface.clone(), surface)?;

    match cli.command {
        Command::Convert(job) => run_job(&state, ToolInput::Conversion, job).await,
        Command::Resize {
            job,
            mode,
            width,
            height,
            percentage,
        } => {
            let params = ResizeParams {
                mode,
                width,
                height,
                percentage,
            };
            run_job(&state, ToolInput::Resizing(params), job).await
        }
        Command::Watermark {
            job,
            text,
            image,
            position,
            opacity,
            size,
        } => {
            let mut params = match image {
                Some(path) => WatermarkParams::image(Some(watermark_file(&path).await?)),
                None => WatermarkParams::text(text.unwrap_or_default()),
            };
            params.position = position;
            params.opacity = opacity;
            params.size = size;
            run_job(&state, ToolInput::Watermark(params), job).await
        }
        Command::Geotag {
            job,
            country,
            state: province,
            city,
            client,
            taken_at,
        } => {
            commands::load_presets(&state).await;
            if let Some(country) = country {
                commands::pick_country(&state, &country).await;
            }
            if let Some(province) = province {
                commands::pick_state(&state, &province).await;
            }
            if let Some(city) = city {
                let fields = commands::pick_city(&state, &city).await;
                if fields.latitude.is_empty() {
                    bail!("Unknown city preset: {}", city);
                }
            }
            if let Some(client) = client {
                commands::pick_client_preset(&state, &client).await?;
            }
            run_job(&state, ToolInput::Geotagging { taken_at }, job).await
        }
        Command::Presets { family } => {
            commands::load_presets(&state).await;
            let presets = state.presets.read().await;
            match family {
                PresetsCommand::Cities => {
                    for row in presets.city_rows() {
                        println!(
                            "{}\t{}\t{}\t{}\t{:.6},{:.6}",
                            row.preset.id,
                            row.preset.name,
                            row.country,
                            row.state,
                            row.preset.center.lat,
                            row.preset.center.lng
                        );
                    }
                }
                PresetsCommand::Clients => {
                    for preset in presets.clients_sorted() {
                        println!("{}\t{}", preset.id, preset.name);
                    }
                }
            }
            Ok(())
        }
    }
}

/// Selects the files, submits and waits for the job to settle.
async fn run_job(state: &AppState, input: ToolInput, job: JobArgs) -> Result<()> {
    let tool = input.tool();
    let cwd = std::env::current_dir().ok();
    let entries = job
        .files
        .iter()
        .map(|path| RawFileEntry::from_path(path, relative_path(path, cwd.as_deref())))
        .collect();
    commands::select_files(state, tool, entries).await;

    let token = commands::submit_tool(state, input, job.format).await?;
    let session = commands::wait_for_job(state, tool, token).await;

    match session.state {
        JobState::Succeeded => {
            if let Some(url) = session.download_url {
                println!("{}", download_link(state, &url));
            }
            Ok(())
        }
        _ => bail!(
            "{} job failed: {}",
            tool,
            session.error_message.unwrap_or_else(|| "unknown error".into())
        ),
    }
}

/// Path sent to the backend for `path`: relative to `cwd` when it lies
/// below it, otherwise none. Local absolute paths are never sent.
fn relative_path(path: &Path, cwd: Option<&Path>) -> Option<String> {
    let relative = if path.is_absolute() {
        path.strip_prefix(cwd?).ok()?
    } else {
        path
    };
    let cleaned: PathBuf = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    if cleaned.as_os_str().is_empty() || relative.components().any(|c| c == Component::ParentDir) {
        return None;
    }
    Some(cleaned.to_string_lossy().replace('\\', "/"))
}

/// Resolves a backend-relative download URL against the base URL.
fn download_link(state: &AppState, url: &str) -> String {
    state
        .config
        .base_url()
        .ok()
        .and_then(|base| base.join(url).ok())
        .map(|joined| joined.to_string())
        .unwrap_or_else(|| url.to_string())
}

async fn watermark_file(path: &Path) -> Result<PendingFile> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read watermark image {}", path.display()))?;
    Ok(PendingFile {
        handle: FileHandle::Path(path.to_path_buf()),
        path: path.to_string_lossy().into_owned(),
        size_bytes: meta.len(),
    })
}
