use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use yt_srec::chat::CommandChatCapture;
use yt_srec::config::AppConfig;
use yt_srec::downloader::{CaptureBackend, FfmpegBackend};
use yt_srec::logging::{init_logging, spawn_retention_cleanup};
use yt_srec::metrics::{MetricsCollector, PrometheusExporter};
use yt_srec::monitor::{FallbackResolver, LivePoller, LiveStatusResolver};
use yt_srec::recorder::Recorder;
use yt_srec::utils::fs::write_atomic;
use yt_srec::youtube::{YoutubeApiClient, YtDlp};

#[derive(Parser, Debug)]
#[command(name = "yt-srec", version, about = "Records live channels while they are live")]
struct Cli {
    /// Log filter directive, overrides RUST_LOG
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the configured channels and record them (default)
    Run {
        /// Periodically write Prometheus text metrics to this file
        #[arg(long, env = "METRICS_FILE")]
        metrics_file: Option<PathBuf>,
    },
    /// Print the live stream id of a channel
    Check {
        /// Channel to check, defaults to the first configured one
        channel: Option<String>,
    },
    /// Print the HLS heights available for a channel's live stream
    Formats {
        /// Channel to inspect, defaults to the first configured one
        channel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let mut logging = config.logging_options();
    logging.filter = cli.log_filter.clone();
    let _guard = init_logging(&logging)?;

    match cli.command.unwrap_or(Command::Run { metrics_file: None }) {
        Command::Run { metrics_file } => run(config, metrics_file).await,
        Command::Check { channel } => check(&config, channel).await,
        Command::Formats { channel } => formats(&config, channel).await,
    }
}

fn build_resolver(config: &AppConfig, ytdlp: Arc<YtDlp>) -> anyhow::Result<FallbackResolver> {
    let api: Option<Arc<dyn LiveStatusResolver>> = match &config.api_key {
        Some(key) => Some(Arc::new(YoutubeApiClient::new(key.clone())?)),
        None => None,
    };
    Ok(FallbackResolver::new(api, ytdlp))
}

fn pick_channel(config: &AppConfig, channel: Option<String>) -> anyhow::Result<String> {
    channel
        .or_else(|| config.channel_ids.first().cloned())
        .context("no channels configured")
}

async fn run(config: AppConfig, metrics_file: Option<PathBuf>) -> anyhow::Result<()> {
    let metrics = Arc::new(MetricsCollector::new());
    let ytdlp = Arc::new(YtDlp::with_binary(&config.ytdlp_path));
    let ffmpeg = Arc::new(FfmpegBackend::with_binary(&config.ffmpeg_path));

    match ffmpeg.version() {
        Some(version) => info!("Using {}", version),
        None => warn!(path = %config.ffmpeg_path, "ffmpeg not available, recordings will fail to start"),
    }
    match ytdlp.version() {
        Some(version) => info!("Using yt-dlp {}", version),
        None => warn!(path = %config.ytdlp_path, "yt-dlp not available"),
    }

    let resolver = Arc::new(build_resolver(&config, ytdlp.clone())?);

    let mut recorder = Recorder::new(config.recorder_config(), metrics.clone())
        .with_backend(ffmpeg.clone() as Arc<dyn CaptureBackend>)
        .with_locator(ytdlp);
    if let Some(chat) = config
        .chat_command
        .as_deref()
        .and_then(CommandChatCapture::from_command_line)
    {
        info!(program = %chat.program(), "Chat capture enabled");
        recorder = recorder.with_chat(Arc::new(chat));
    }
    let recorder = Arc::new(recorder);

    let poller = LivePoller::new(
        config.poller_config(),
        resolver,
        recorder.clone(),
        metrics.clone(),
    );

    let cancel = CancellationToken::new();
    let retention = config
        .log_dir
        .clone()
        .map(|dir| spawn_retention_cleanup(dir, cancel.clone()));

    let exporter = PrometheusExporter::new(metrics.clone());
    let metrics_task = metrics_file.map(|path| {
        let cancel = cancel.clone();
        let interval = config.poll_interval;
        tokio::spawn(async move {
            loop {
                if let Err(e) = write_atomic(&path, exporter.export().as_bytes()).await {
                    warn!(path = %path.display(), "Failed to write metrics: {}", e);
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    });

    let poll_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    cancel.cancel();
    drain(poll_task, &recorder).await;

    for task in [retention, metrics_task].into_iter().flatten() {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            debug!("Background task did not finish in time");
        }
    }

    info!(
        started = metrics.recordings_started(),
        stopped = metrics.recordings_stopped(),
        "Shutdown complete"
    );
    Ok(())
}

/// Wait for the poller to finish, then shut the recorder down. The recorder
/// is drained even when the poller task failed.
async fn drain(poll_task: JoinHandle<()>, recorder: &Recorder) {
    if let Err(e) = poll_task.await {
        error!("Live poller task failed: {}", e);
    }
    recorder.shutdown().await;
}

async fn check(config: &AppConfig, channel: Option<String>) -> anyhow::Result<()> {
    let channel = pick_channel(config, channel)?;
    let resolver = build_resolver(config, Arc::new(YtDlp::with_binary(&config.ytdlp_path)))?;

    match resolver.resolve_live_stream(&channel).await? {
        Some(stream_id) => println!("Channel {} live video id: {}", channel, stream_id),
        None => println!("Channel {} is not live", channel),
    }
    Ok(())
}

async fn formats(config: &AppConfig, channel: Option<String>) -> anyhow::Result<()> {
    let channel = pick_channel(config, channel)?;
    let ytdlp = Arc::new(YtDlp::with_binary(&config.ytdlp_path));
    let resolver = build_resolver(config, ytdlp.clone())?;

    let Some(stream_id) = resolver.resolve_live_stream(&channel).await? else {
        println!("No live detected for {}", channel);
        return Ok(());
    };

    let heights = ytdlp.list_heights(&stream_id).await?;
    println!("Live {} HLS heights: {:?}", stream_id, heights);
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use yt_srec::Error;
    use yt_srec::domain::RecordingState;
    use yt_srec::downloader::{CaptureHandle, CaptureRequest, LocatorResolver, Quality};
    use yt_srec::recorder::{RecorderConfig, SessionControl};

    use super::*;

    /// Backend whose capture runs until terminated.
    struct Endless;

    #[async_trait]
    impl CaptureBackend for Endless {
        fn name(&self) -> &'static str {
            "endless"
        }

        async fn run_capture(&self, _request: CaptureRequest) -> yt_srec::Result<CaptureHandle> {
            let (tx, rx) = oneshot::channel();
            let terminate = CancellationToken::new();
            let token = terminate.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                let _ = tx.send(None);
            });
            Ok(CaptureHandle::new(rx, terminate))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Direct;

    #[async_trait]
    impl LocatorResolver for Direct {
        async fn resolve_capture_locator(
            &self,
            stream_id: &str,
            _quality: Quality,
        ) -> yt_srec::Result<String> {
            Ok(format!("https://cdn/{}.m3u8", stream_id))
        }
    }

    #[tokio::test]
    async fn test_drain_shuts_down_recorder_after_poller_panic() {
        let dir = TempDir::new().unwrap();
        let config = RecorderConfig {
            output_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let recorder = Recorder::new(config, Arc::new(MetricsCollector::new()))
            .with_backend(Arc::new(Endless))
            .with_locator(Arc::new(Direct));
        recorder.start("UC1", "V1").await.unwrap();

        let poll_task: JoinHandle<()> = tokio::spawn(async { panic!("poller blew up") });
        tokio::time::timeout(Duration::from_secs(5), drain(poll_task, &recorder))
            .await
            .unwrap();

        assert_eq!(recorder.get_state("UC1"), RecordingState::Idle);
        let err = recorder.start("UC1", "V2").await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
    }
}
