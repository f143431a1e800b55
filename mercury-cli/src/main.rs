//! Mercury CLI
//!
//! Runs the live bus-location service and offers offline tools for
//! inspecting feed records and captured frames.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use mercury_api::{ApiConfig, ApiServer};
use mercury_cache::FleetCache;
use mercury_core::constants::{DEFAULT_FEED_URL, FEED_MIME_TYPE};
use mercury_feed::{decode_record, parse_frame};
use mercury_intercept::{FeedInterceptor, InterceptorConfig, LongPollTap};

/// Mercury - live bus locations from a realtime feed
#[derive(Parser)]
#[command(name = "mercury")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the live feed and serve locations over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT", default_value = "8090")]
        port: u16,
        /// Bind address
        #[arg(short, long, env = "BIND", default_value = "0.0.0.0")]
        bind: String,
        /// Page hosting the realtime feed
        #[arg(long, env = "FEED_URL", default_value = DEFAULT_FEED_URL)]
        feed_url: String,
        /// Content type that marks feed traffic
        #[arg(long, env = "FEED_MIME_TYPE", default_value = FEED_MIME_TYPE)]
        mime_type: String,
    },

    /// Decode a single pipe-delimited location record
    Decode {
        /// Raw record, e.g. "D1|B1|12:00|R1|In|54.1|-4.5|2026-01-11T03:55:00Z|1|x"
        record: String,
    },

    /// Parse a captured feed frame from a file
    Parse {
        /// Path to the raw frame bytes
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging: RUST_LOG, then --verbose, then LOG_LEVEL
    let log_level = std::env::var("LOG_LEVEL").ok();
    let (filter, invalid_level) = default_directive(cli.verbose, log_level.as_deref());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.as_str().into());

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("text")) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    if let Some(value) = invalid_level {
        warn!(value = %value, "Invalid LOG_LEVEL, defaulting to info");
    }

    match cli.command {
        Commands::Serve { port, bind, feed_url, mime_type } => {
            cmd_serve(port, &bind, &feed_url, mime_type).await
        }
        Commands::Decode { record } => cmd_decode(&record),
        Commands::Parse { file } => cmd_parse(&file),
    }
}

/// Filter directive used when RUST_LOG is unset.
///
/// Returns the rejected value when LOG_LEVEL cannot be parsed.
fn default_directive(verbose: bool, log_level: Option<&str>) -> (String, Option<String>) {
    if verbose {
        return ("mercury=debug,info".into(), None);
    }

    let raw = match log_level.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return ("mercury=info,warn".into(), None),
    };

    // logrus spellings
    let normalized = match raw.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "fatal" | "panic" => "error".to_string(),
        other => other.to_string(),
    };

    match normalized.parse::<LevelFilter>() {
        Ok(_) => (format!("mercury={},warn", normalized), None),
        Err(_) => ("mercury=info,warn".into(), Some(raw.to_string())),
    }
}

/// Run the interceptor and API server until a shutdown signal
async fn cmd_serve(port: u16, bind: &str, feed_url: &str, mime_type: String) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .context("Invalid bind address")?;
    let source_url = Url::parse(feed_url).context("Invalid feed URL")?;

    println!("{}", "🚌 Starting Mercury...".cyan().bold());
    println!("   {} {}", "Feed:".green(), source_url);
    println!("   {} http://{}", "Listening on:".green(), addr);
    println!("   {} http://{}/health", "Health check:".dimmed(), addr);
    println!("\n   Press Ctrl+C to stop.\n");

    let cache = Arc::new(FleetCache::new());
    let shutdown = CancellationToken::new();

    let tap = Arc::new(LongPollTap::new()?);
    let interceptor = FeedInterceptor::with_config(
        tap,
        cache.clone(),
        InterceptorConfig {
            mime_type,
            ..InterceptorConfig::default()
        },
    );

    let interceptor_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = interceptor.run(&source_url, shutdown.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "Feed interceptor stopped");
                // No feed, nothing left to serve.
                shutdown.cancel();
            }
            info!(stats = ?interceptor.stats(), "Feed interceptor finished");
            result
        })
    };

    tokio::spawn(watch_signals(shutdown.clone()));

    let server = ApiServer::new(ApiConfig::from_env(), cache);
    server.run(addr, shutdown.clone()).await?;

    shutdown.cancel();
    interceptor_task
        .await
        .context("Interceptor task panicked")??;

    println!("{}", "👋 Mercury stopped.".cyan());
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

/// Decode one record and print it as JSON
fn cmd_decode(record: &str) -> Result<()> {
    match decode_record(record) {
        Ok(location) => {
            println!("{}", "✅ Decoded record:".green().bold());
            println!("{}", serde_json::to_string_pretty(&location)?);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "❌ Rejected:".red().bold(), e);
            Err(e.into())
        }
    }
}

/// Parse a captured frame and summarize what it holds
fn cmd_parse(path: &Path) -> Result<()> {
    let frame = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    println!("{} {} ({} bytes)", "🔎 Parsing frame:".cyan().bold(), path.display(), frame.len());

    match parse_frame(&frame) {
        Ok(parsed) => {
            println!(
                "\n{} {} location(s) from {} sub-message(s)",
                "✅".green(),
                parsed.records.len(),
                parsed.sub_messages
            );
            for record in &parsed.records {
                println!(
                    "   {} route {} {} at ({:.5}, {:.5})",
                    record.bus_id.yellow(),
                    record.route,
                    record.direction.dimmed(),
                    record.latitude,
                    record.longitude
                );
            }
            if parsed.dropped_records > 0 {
                println!("   {} {} record(s) dropped", "⚠️".yellow(), parsed.dropped_records);
            }
            for issue in &parsed.issues {
                println!("   {} sub-message #{}: {:?}", "⚠️".yellow(), issue.index, issue.kind);
            }
        }
        Err(e) => {
            let label = if e.is_corrupt() { "❌ Corrupt frame:".red() } else { "ℹ️  Empty tick:".yellow() };
            println!("\n{} {}", label, e);
            let mercury_feed::FrameError::NoLocations { issues, .. } = &e;
            for issue in issues {
                println!("   sub-message #{}: {:?}", issue.index, issue.kind);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_without_level() {
        assert_eq!(default_directive(false, None), ("mercury=info,warn".into(), None));
        assert_eq!(default_directive(false, Some("  ")), ("mercury=info,warn".into(), None));
    }

    #[test]
    fn test_default_directive_from_log_level() {
        assert_eq!(default_directive(false, Some("debug")).0, "mercury=debug,warn");
        assert_eq!(default_directive(false, Some("ERROR")).0, "mercury=error,warn");
        assert_eq!(default_directive(false, Some("warning")).0, "mercury=warn,warn");
        assert_eq!(default_directive(false, Some("fatal")).0, "mercury=error,warn");
    }

    #[test]
    fn test_default_directive_invalid_level_falls_back_to_info() {
        assert_eq!(
            default_directive(false, Some("loud")),
            ("mercury=info,warn".into(), Some("loud".into()))
        );
    }

    #[test]
    fn test_verbose_wins_over_log_level() {
        assert_eq!(default_directive(true, Some("error")).0, "mercury=debug,info");
    }
}
