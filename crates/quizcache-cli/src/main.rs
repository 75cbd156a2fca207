//! quizcache - command-line front end for the quiz resource layer.
//!
//! Runs an offline proxy agent over the persistent store, then loads quiz
//! content through it or sends it a control message. Results are printed
//! to stdout as JSON; logs go to stderr.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::Mutex;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quizcache_core::agent::TracingNotifier;
use quizcache_core::{
    spawn_agent, AgentHandle, CacheStorage, Config, ControlMessage, ControlReply, HttpFetcher, OfflineProxyAgent,
    ResourceCache, ResourceLoader, TracingReporter,
};

/// How long to wait for the agent to answer a control message
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period after a scheduled notification fires
const NOTIFY_GRACE_MS: u64 = 250;

const USAGE: &str = "\
Usage: quizcache <command> [args]

Commands:
  metadata                        Print the theme index
  quiz <theme-id> <quiz-id>       Print one quiz document
  version                         Print the agent version
  clear                           Delete every store of this application
  cache-audio <url>...            Store audio clips for offline use
  precache <asset>...             Store additional assets
  notify <title> <body> <delay>   Show a notification after <delay> ms

Environment:
  RUST_LOG                        Log filter (default: warn)
  QUIZCACHE_LOG_DIR               Also write daily log files here
  QUIZCACHE_BASE_URL, QUIZCACHE_DATA_PATH,
  QUIZCACHE_CACHE_ENABLED, QUIZCACHE_STORE_DIR";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("QUIZCACHE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "quizcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    if command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let _guard = init_tracing();

    let config = Arc::new(Config::load()?);
    let store_dir = config.store_dir()?;
    info!(store_dir = %store_dir.display(), "quizcache starting");

    let storage = Arc::new(CacheStorage::open_dir(store_dir).await?);
    let network = Arc::new(HttpFetcher::new(&config.base_url()?)?);
    let agent = OfflineProxyAgent::new(&config, storage, network, Arc::new(TracingNotifier::default()))?;
    let (handle, task) = spawn_agent(Arc::new(agent));

    // This process is the only page, so an older version holds nothing
    handle.release_clients().await?;

    let result = run_command(command, &args[1..], &config, &handle).await;

    drop(handle);
    let _ = task.await;
    info!("quizcache shutting down");
    result
}

async fn run_command(command: &str, args: &[String], config: &Arc<Config>, handle: &AgentHandle) -> Result<()> {
    match command {
        "metadata" => {
            let metadata = loader(config, handle).load_metadata().await;
            print_json(metadata.as_ref())
        }
        "quiz" => {
            let [theme_id, quiz_id] = args else {
                bail!("usage: quizcache quiz <theme-id> <quiz-id>");
            };
            let theme_id: i64 = theme_id.parse().context("theme id must be an integer")?;
            let quiz_id: i64 = quiz_id.parse().context("quiz id must be an integer")?;
            let quiz = loader(config, handle).load_quiz(theme_id, quiz_id).await?;
            print_json(quiz.as_ref())
        }
        "version" => control(handle, ControlMessage::GetVersion).await,
        "clear" => control(handle, ControlMessage::ClearCache).await,
        "cache-audio" => {
            if args.is_empty() {
                bail!("usage: quizcache cache-audio <url>...");
            }
            control(
                handle,
                ControlMessage::CacheAudio {
                    audio_urls: args.to_vec(),
                },
            )
            .await
        }
        "precache" => {
            if args.is_empty() {
                bail!("usage: quizcache precache <asset>...");
            }
            control(handle, ControlMessage::PrecacheAssets { assets: args.to_vec() }).await
        }
        "notify" => {
            let [title, body, delay] = args else {
                bail!("usage: quizcache notify <title> <body> <delay-ms>");
            };
            let delay: u64 = delay.parse().context("delay must be a number of milliseconds")?;
            control(
                handle,
                ControlMessage::ScheduleNotification {
                    title: title.clone(),
                    body: body.clone(),
                    delay,
                },
            )
            .await?;
            // Keep the agent alive until the timer fires
            tokio::time::sleep(Duration::from_millis(delay + NOTIFY_GRACE_MS)).await;
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

/// Page-side loader whose every request goes through the agent.
fn loader(config: &Arc<Config>, handle: &AgentHandle) -> ResourceLoader {
    let cache = Arc::new(Mutex::new(ResourceCache::new(config.quiz_capacity())));
    ResourceLoader::new(
        Arc::clone(config),
        Arc::new(handle.clone()),
        cache,
        Arc::new(TracingReporter),
    )
}

async fn control(handle: &AgentHandle, message: ControlMessage) -> Result<()> {
    let reply: ControlReply = handle.request(message, CONTROL_TIMEOUT).await?;
    print_json(&reply)?;
    if !reply.is_success() {
        bail!("agent reported failure");
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
