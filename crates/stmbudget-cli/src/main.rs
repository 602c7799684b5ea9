//! STMBudget CLI - drives the client data layer from the command line.
//!
//! Fetches and navigates through the same cache, retry and offline-queue
//! machinery the web client uses, which makes it handy for warming caches and
//! replaying queued mutations.

mod view;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use stmbudget_core::api::HttpTransport;
use stmbudget_core::router::{default_routes, menu_items};
use stmbudget_core::worker::{WorkerMessage, WorkerReply};
use stmbudget_core::{Client, ClientEvent, Config, FetchOptions, Method, Session};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use view::TerminalView;

// ============================================================================
// Constants
// ============================================================================

/// Directory for rolling log files; unset means stderr only
const LOG_DIR_ENV: &str = "STMBUDGET_LOG_DIR";

const LOG_FILE_PREFIX: &str = "stmbudget.log";

const USAGE: &str = "\
Usage: stmbudget <command> [args]

Commands:
  fetch <url> [--no-cache] [--method M] [--json BODY]
                          Fetch through the data manager and print the payload
  navigate <path>...      Navigate to each path in turn and print the final page
  sync                    Replay queued offline requests
  queue                   List queued offline requests
  cache-size              Show response cache and worker cache sizes
  clear-cache             Clear the response cache and worker caches
  routes                  List screens available to the signed-in role
  offline <on|off>        Persist offline mode in the config";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
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
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    match command.as_str() {
        "routes" => return list_routes(&config),
        "offline" => return set_offline(config, args.get(1).map(String::as_str)),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            return Ok(());
        }
        _ => {}
    }

    let session = load_session(&config);
    let mut transport = HttpTransport::new(config.base_url.as_deref())?;
    if let Some(token) = session.csrf_token() {
        transport = transport.with_csrf_token(token.to_string());
    }

    let view = Arc::new(TerminalView::default());
    let mut client = Client::init(config, &session, Arc::new(transport), view.clone())?;
    info!(command = %command, "STMBudget CLI starting");

    let result = match command.as_str() {
        "fetch" => fetch(&client, &args[1..]).await,
        "navigate" => navigate(&client, &view, &args[1..]).await,
        "sync" => sync(&client).await,
        "queue" => {
            list_queue(&client);
            Ok(())
        }
        "cache-size" => cache_size(&client).await,
        "clear-cache" => clear_cache(&client).await,
        other => Err(anyhow::anyhow!("Unknown command '{}'\n\n{}", other, USAGE)),
    };

    for event in client.drain_events() {
        report_event(&event);
    }
    client.dispose().await;
    result
}

fn load_session(config: &Config) -> Session {
    let mut session = Session::new(config.cache_dir().unwrap_or_else(|_| ".".into()));
    match session.load() {
        Ok(true) => info!(role = ?session.role(), "Loaded saved session"),
        Ok(false) => info!("No saved session"),
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable session"),
    }
    session
}

async fn fetch(client: &Client, args: &[String]) -> Result<()> {
    let Some(url) = args.first() else {
        bail!("fetch needs a URL");
    };

    let mut options = FetchOptions::default();
    let mut rest = args[1..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--no-cache" => options.use_cache = false,
            "--method" => {
                let raw = rest.next().context("--method needs a value")?;
                options.request.method =
                    Method::parse(raw).with_context(|| format!("Unknown method '{}'", raw))?;
            }
            "--json" => {
                let raw = rest.next().context("--json needs a value")?;
                let body = serde_json::from_str(raw).context("--json is not valid JSON")?;
                options.request.body = Some(body);
            }
            other => bail!("Unknown fetch option '{}'", other),
        }
    }

    let payload = client.data().fetch_data(url, options).await?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn navigate(client: &Client, view: &TerminalView, paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        bail!("navigate needs at least one path");
    }
    for path in paths {
        if !client.navigator().navigate(path, true).await {
            bail!("Navigation to {} failed", path);
        }
    }
    println!("# {}\n\n{}", view.title(), view.content());
    Ok(())
}

async fn sync(client: &Client) -> Result<()> {
    let queued = client.queue().len();
    if queued == 0 {
        println!("Offline queue is empty");
        return Ok(());
    }
    let report = client.worker().sync().await?;
    println!(
        "Replayed {} of {} queued request(s); {} left for the next sync",
        report.replayed.len(),
        queued,
        report.failed.len()
    );
    Ok(())
}

fn list_queue(client: &Client) {
    let items = client.queue().items();
    if items.is_empty() {
        println!("Offline queue is empty");
        return;
    }
    for item in items {
        println!(
            "#{:<4} {:<6} {}  (queued {}, {} attempt(s))",
            item.id,
            item.options.method.as_str(),
            item.url,
            item.enqueued_at.format("%Y-%m-%d %H:%M"),
            item.attempts
        );
    }
}

async fn cache_size(client: &Client) -> Result<()> {
    let stats = client.cache().stats();
    println!(
        "Response cache: {} entries (hits {}, misses {}, evictions {})",
        client.cache().len(),
        stats.hits,
        stats.misses,
        stats.evictions
    );
    match client.worker().post(WorkerMessage::GetCacheSize).await? {
        WorkerReply::CacheSize { size } => println!(
            "Worker caches: {} responses, {} bytes",
            size,
            client.worker().worker().cache_size_bytes()
        ),
        other => bail!("Unexpected worker reply: {:?}", other),
    }
    Ok(())
}

async fn clear_cache(client: &Client) -> Result<()> {
    client.data().clear_cache();
    client.worker().post(WorkerMessage::ClearCache).await?;
    println!("Caches cleared");
    Ok(())
}

fn list_routes(config: &Config) -> Result<()> {
    let session = load_session(config);
    let role = session.role();
    let routes = default_routes()?;

    match role {
        Some(role) => println!("Signed in as {}", role),
        None => println!("No session; showing public screens only"),
    }
    println!();
    for item in menu_items(&routes, role) {
        println!("  {:<12} {}", item.label, item.url);
    }
    println!();
    for route in routes.iter().filter(|r| r.allows(role) && r.redirect.is_none()) {
        println!("  {:<28} {}", route.pattern.as_str(), route.display_title());
    }
    Ok(())
}

fn set_offline(mut config: Config, value: Option<&str>) -> Result<()> {
    config.offline_mode = match value {
        Some("on") => true,
        Some("off") => false,
        _ => bail!("offline needs 'on' or 'off'"),
    };
    config.save().context("Failed to save config")?;
    println!("Offline mode {}", if config.offline_mode { "on" } else { "off" });
    Ok(())
}

fn report_event(event: &ClientEvent) {
    match event {
        ClientEvent::Error(message) => eprintln!("error: {}", message),
        ClientEvent::Synced { id, url } => eprintln!("synced #{} {}", id, url),
        ClientEvent::Connectivity { online } => {
            eprintln!("connectivity: {}", if *online { "online" } else { "offline" })
        }
        ClientEvent::Navigation(event) => tracing::debug!(?event, "Navigation event"),
    }
}
