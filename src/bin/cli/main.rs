use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use object_store_replay::{
    create_s3_app, AppServices, BucketName, ChangeSink, FileChangeLog, ObjectKey,
    ReplayListOptions, ReplayOptions, ReplayResult, ReplayStatus, RollbackRequest,
    RollbackTarget, S3Config,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "object-replay")]
#[command(about = "Point-in-time rollback and change replay for versioned buckets", long_about = None)]
struct Cli {
    /// S3-compatible endpoint, host[:port]
    #[arg(long, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    /// Region passed through to the endpoint
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    region: String,

    /// Access key for the endpoint
    #[arg(long, env = "S3_ACCESS_KEY")]
    access_key: Option<String>,

    /// Secret key for the endpoint
    #[arg(long, env = "S3_SECRET_KEY")]
    secret_key: Option<String>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long, env = "S3_INSECURE")]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Roll objects back to their state at or before an instant
    Rollback {
        /// Bucket to roll back
        #[arg(short, long)]
        bucket: String,

        /// Target instant (ISO 8601: YYYY-MM-DDThh:mm:ssZ)
        #[arg(short, long)]
        timestamp: String,

        /// Single object key to roll back
        #[arg(short, long, conflicts_with = "prefix")]
        key: Option<String>,

        /// Roll back every key under this prefix (empty = whole bucket)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Enumerate changes since an instant into a portable change log
    ReplayList {
        /// Bucket to enumerate
        #[arg(short, long)]
        bucket: String,

        /// Start instant, inclusive (ISO 8601: YYYY-MM-DDThh:mm:ssZ)
        #[arg(short, long)]
        timestamp: String,

        /// Only keys under this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        /// Changes per sink write
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// Re-apply a recorded change log against a destination bucket
    Replay {
        /// Change log produced by replay-list
        #[arg(short = 'f', long)]
        source_file: PathBuf,

        /// Bucket receiving the replayed changes
        #[arg(short = 'b', long)]
        dest_bucket: String,

        /// Bucket holding the version history (defaults to dest)
        #[arg(short = 's', long)]
        source_bucket: Option<String>,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        /// Playback speed multiplier (2.0 = twice as fast)
        #[arg(short = 'x', long, default_value_t = 1.0)]
        speed_factor: f64,

        /// Go through the motions without touching the store
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Dispatch changes as fast as workers free up
        #[arg(long)]
        ignore_time_windows: bool,

        /// Write per-event detail to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
}

impl Commands {
    fn debug(&self) -> bool {
        match self {
            Commands::Rollback { debug, .. }
            | Commands::ReplayList { debug, .. }
            | Commands::Replay { debug, .. } => *debug,
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| {
            format!("invalid timestamp '{value}'; expected ISO 8601, e.g. 2023-01-01T12:00:00Z")
        })
}

fn build_services(cli: &Cli, cancel: &CancellationToken) -> Result<AppServices> {
    let Some(endpoint) = cli.endpoint.clone() else {
        bail!("an object store endpoint is required (--endpoint or S3_ENDPOINT)");
    };
    let config = S3Config {
        endpoint,
        region: cli.region.clone(),
        access_key: cli.access_key.clone(),
        secret_key: cli.secret_key.clone(),
        secure: !cli.insecure,
    };
    Ok(create_s3_app(config, cancel.clone())?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.command.debug() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            signal_cancel.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "run completed with failures");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of per-item failures; fatal errors bubble up
async fn run(cli: Cli, cancel: CancellationToken) -> Result<usize> {
    let services = build_services(&cli, &cancel)?;

    match cli.command {
        Commands::Rollback {
            ref bucket,
            ref timestamp,
            ref key,
            ref prefix,
            concurrency,
            ..
        } => {
            let timestamp = parse_timestamp(timestamp)?;
            let bucket = BucketName::new(bucket.clone()).context("invalid bucket name")?;
            let target = match (key, prefix) {
                (Some(key), None) => {
                    RollbackTarget::Key(ObjectKey::new(key.clone()).context("invalid object key")?)
                }
                (None, prefix) => RollbackTarget::Prefix(prefix.clone().unwrap_or_default()),
                (Some(_), Some(_)) => bail!("--key and --prefix are mutually exclusive"),
            };

            let summary = services
                .rollback
                .run(
                    RollbackRequest {
                        bucket,
                        target,
                        timestamp,
                        concurrency,
                    },
                    &cancel,
                )
                .await?;

            println!("Rollback summary:");
            println!("  examined:  {}", summary.examined);
            println!("  restored:  {}", summary.restored);
            println!("  deleted:   {}", summary.deleted);
            println!("  unchanged: {}", summary.unchanged);
            println!("  failed:    {}", summary.failed);
            for (key, message) in &summary.failures {
                println!("    {key}: {message}");
            }
            Ok(summary.failed)
        }

        Commands::ReplayList {
            ref bucket,
            ref timestamp,
            ref prefix,
            ref output,
            concurrency,
            batch_size,
            ..
        } => {
            let since = parse_timestamp(timestamp)?;
            let options = ReplayListOptions {
                bucket: BucketName::new(bucket.clone()).context("invalid bucket name")?,
                prefix: prefix.clone(),
                since,
                concurrency,
                batch_size,
            };

            let sink = match output {
                Some(path) => FileChangeLog::create(path)
                    .with_context(|| format!("cannot create {}", path.display()))?,
                None => FileChangeLog::stdout().context("cannot write to stdout")?,
            };

            let written = services.replay_list.run(&options, &sink, &cancel).await?;
            sink.close().context("failed to finalize change log")?;

            match output {
                Some(path) => info!(changes = written, file = %path.display(), "change log written"),
                None => info!(changes = written, "change log written to stdout"),
            }
            Ok(0)
        }

        Commands::Replay {
            ref source_file,
            ref dest_bucket,
            ref source_bucket,
            concurrency,
            speed_factor,
            dry_run,
            ignore_time_windows,
            ref output,
            ..
        } => {
            if speed_factor <= 0.0 {
                bail!("--speed-factor must be greater than zero");
            }
            let dest_bucket = BucketName::new(dest_bucket.clone())
                .context("invalid destination bucket name")?;
            let source_bucket = match source_bucket {
                Some(name) => BucketName::new(name.clone())
                    .context("invalid source bucket name")?,
                None => dest_bucket.clone(),
            };

            let options = ReplayOptions {
                source_bucket: source_bucket.as_str().to_string(),
                dest_bucket: dest_bucket.as_str().to_string(),
                concurrency,
                speed_factor,
                dry_run,
                ignore_timing: ignore_time_windows,
            };

            let result = services
                .replay
                .replay_file(source_file, options, &cancel)
                .await?;

            let stdout = std::io::stdout();
            render_replay_result(&result, &mut stdout.lock())
                .context("failed to render summary")?;

            if let Some(path) = output {
                let mut file = std::fs::File::create(path)
                    .with_context(|| format!("cannot create {}", path.display()))?;
                writeln!(file, "Replay detail")?;
                writeln!(file, "Generated: {}\n", Utc::now().to_rfc3339())?;
                render_replay_result(&result, &mut file)?;
                info!(file = %path.display(), "detailed results written");
            }

            Ok(result.failed_events)
        }
    }
}

/// Human-readable run summary; long event lists elide the middle
fn render_replay_result(result: &ReplayResult, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "Replay result:")?;
    writeln!(out, "  started:  {}", result.start_time.to_rfc3339())?;
    writeln!(out, "  finished: {}", result.end_time.to_rfc3339())?;
    writeln!(out, "  duration: {}s", result.duration().num_seconds())?;
    writeln!(out, "  total:    {}", result.total_events)?;
    writeln!(out, "  success:  {}", result.success_events)?;
    writeln!(out, "  failed:   {}", result.failed_events)?;
    writeln!(out, "  skipped:  {}", result.skipped_events)?;

    if result.events.is_empty() {
        return Ok(());
    }

    writeln!(out, "\nEvents:")?;
    let total = result.events.len();
    let elide = total > 20;
    for (idx, event) in result.events.iter().enumerate() {
        if elide && idx == 10 {
            writeln!(out, "  ... {} omitted ...", total - 20)?;
        }
        if elide && idx >= 10 && idx < total - 10 {
            continue;
        }
        writeln!(
            out,
            "  {} - {} - {} - {}",
            event.executed_at.to_rfc3339(),
            event.change.key,
            event.change.change_type,
            event.status
        )?;
        if event.status == ReplayStatus::Failed {
            if let Some(message) = &event.error_message {
                writeln!(out, "    error: {message}")?;
            }
        }
    }
    Ok(())
}
