use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use vision_tech_client::{
    app_state::AppState,
    commands::{jobs, results, CommandResult},
    config::ClientConfig,
    models::{
        detection::{ExportFormat, FrameQuery, ObjectQuery},
        job::{JobId, JobStatus},
    },
};

#[derive(Debug, Parser)]
#[command(name = "vision-tech", version, about = "Vision Tech detection service client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the signed-in user
    Whoami,
    /// List available detection models
    Models,
    /// Submit a detection job for a video
    Submit {
        video_id: i64,
        #[arg(long, env = "VISION_DEFAULT_MODEL", default_value = "yolov8n")]
        model: String,
        /// Model parameters as a JSON object, e.g. '{"conf": 0.4}'
        #[arg(long, value_parser = parse_json)]
        params: Option<serde_json::Value>,
        /// Keep watching the job until it finishes
        #[arg(long)]
        watch: bool,
    },
    /// Show one job's current record
    Status { job_id: JobId },
    /// List detection jobs for a video
    Jobs { video_id: i64 },
    /// Poll one or more jobs until they finish
    Watch {
        #[arg(required = true)]
        job_ids: Vec<JobId>,
        /// Print Prometheus metrics to stderr when done
        #[arg(long)]
        metrics: bool,
    },
    /// Cancel a running job
    Cancel { job_id: JobId },
    /// Show per-class detection timeline
    Timeline { job_id: JobId },
    /// List frame detections
    Frames {
        job_id: JobId,
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        start_time: Option<f64>,
        #[arg(long)]
        end_time: Option<f64>,
    },
    /// List detected object thumbnails
    Objects {
        job_id: JobId,
        #[arg(long = "class")]
        class_name: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Export results to a file
    Export {
        job_id: JobId,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn parse_json(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(raw)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CommandResult<ExitCode> {
    let config = ClientConfig::from_env()?;
    tracing::debug!(api_url = %config.api_url, "Configuration loaded");

    let state = AppState::new(config)?;
    state.sign_in().await?;

    match cli.command {
        Command::Whoami => {
            let user = state.auth.current_user().await?;
            println!("{} <{}>", user.display_name(), user.email);
            if let Some(role) = &user.role {
                println!("role: {}", role.name);
            }
        }
        Command::Models => results::models(&state).await?,
        Command::Submit {
            video_id,
            model,
            params,
            watch,
        } => {
            let job = jobs::submit(&state, video_id, model, params).await?;
            if watch {
                let snapshot = jobs::watch_job(&state, job.id).await?;
                if snapshot.status() == Some(JobStatus::Error) {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Status { job_id } => jobs::status(&state, job_id).await?,
        Command::Jobs { video_id } => jobs::list_for_video(&state, video_id).await?,
        Command::Watch { job_ids, metrics } => {
            let prometheus = if metrics { Some(install_metrics()?) } else { None };

            let summary = tokio::select! {
                summary = jobs::watch_many(&state, &job_ids) => Some(summary?),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping trackers");
                    None
                }
            };

            if let Some(handle) = prometheus {
                eprintln!("{}", handle.render());
            }
            if !summary.is_some_and(|s| s.all_completed()) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Cancel { job_id } => jobs::cancel(&state, job_id).await?,
        Command::Timeline { job_id } => results::timeline(&state, job_id).await?,
        Command::Frames {
            job_id,
            skip,
            limit,
            start_time,
            end_time,
        } => {
            let query = FrameQuery {
                skip,
                limit,
                start_time,
                end_time,
            };
            results::frames(&state, job_id, query).await?
        }
        Command::Objects {
            job_id,
            class_name,
            min_confidence,
            limit,
        } => {
            let query = ObjectQuery {
                class_name,
                min_confidence,
                limit,
            };
            results::objects(&state, job_id, query).await?
        }
        Command::Export {
            job_id,
            format,
            output,
        } => {
            results::export(&state, job_id, format, output.as_deref()).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn install_metrics() -> CommandResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "detection_status_fetches_total",
        "Job status fetches by outcome"
    );
    metrics::describe_counter!(
        "detection_polls_skipped_total",
        "Poll ticks skipped because a fetch was still in flight"
    );
    metrics::describe_gauge!(
        "detection_active_pollers",
        "Trackers with an active poll timer"
    );

    Ok(handle)
}
