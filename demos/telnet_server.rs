//! Telnet movie server example
//!
//! Run with: cargo run --example telnet_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example telnet_server                    # binds to 0.0.0.0:2323
//!   cargo run --example telnet_server localhost          # binds to 127.0.0.1:2323
//!   cargo run --example telnet_server 127.0.0.1:2424     # binds to 127.0.0.1:2424
//!
//! ## Watching
//!
//!   telnet localhost 2323
//!   nc localhost 2323
//!
//! Press Ctrl+C to stop. Connected clients get up to 10 seconds to finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ascii_movie::{Frame, Movie, ServerConfig, StreamRegistry, TelnetServer};
use tokio_util::sync::CancellationToken;

const DEFAULT_PORT: u16 = 2323;
const FIELD_WIDTH: usize = 40;

/// A ball crossing the screen and bouncing back
fn bouncing_ball() -> ascii_movie::Result<Movie> {
    let positions = (0..FIELD_WIDTH).chain((1..FIELD_WIDTH - 1).rev());
    let frames: Vec<Frame> = positions
        .enumerate()
        .map(|(i, x)| {
            let mut row = vec![' '; FIELD_WIDTH];
            row[x] = 'o';
            let row: String = row.into_iter().collect();
            let border = "-".repeat(FIELD_WIDTH);
            let data = format!("{border}\n{row}\n{border}");

            let total = 2 * FIELD_WIDTH - 2;
            let filled = (i + 1) * FIELD_WIDTH / total;
            let progress = format!("[{}{}]", "#".repeat(filled), " ".repeat(FIELD_WIDTH - filled));

            Frame::new(data, Duration::from_millis(80), progress)
        })
        .collect();

    Movie::new(frames)
}

/// Parse bind address from command line argument.
///
/// Accepts "localhost", "IP" or "IP:PORT".
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: telnet_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{DEFAULT_PORT})");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ascii_movie=debug".parse()?)
                .add_directive("telnet_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig::default()
        .disable_ssh()
        .telnet_addr(bind_addr)
        .idle_timeout(Duration::from_secs(60));
    config.validate()?;

    let movie = Arc::new(bouncing_ball()?);
    let registry = Arc::new(StreamRegistry::new());
    let server = TelnetServer::new(config, movie, Arc::clone(&registry));

    println!("Streaming on telnet://{bind_addr}");
    println!("Watch with: telnet {} {}", bind_addr.ip(), bind_addr.port());
    println!();

    let ctx = CancellationToken::new();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nShutting down...");
            shutdown.cancel();
        }
    });

    let mut stats = registry.subscribe();
    let report = tokio::spawn(async move {
        while stats.changed().await.is_ok() {
            let snapshot = stats.borrow_and_update().clone();
            println!(
                "Active streams: {} (total served: {})",
                snapshot.active_streams(),
                snapshot.total_connections
            );
        }
    });

    let result = server.listen(ctx).await;
    registry.close().await;
    report.abort();

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
