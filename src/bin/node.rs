//! Ensemble node
//!
//! Joins the ensemble over UDP broadcast and reads console commands.
//!
//! Usage: `node [config.toml]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ensemble_sync::{
    config::AppConfig,
    network::UdpTransport,
    node::{Node, NodeHandle},
    playback::LoggingPlayback,
    protocol::LinkAddress,
    songs,
    sync::{ConductorControls, SongBank},
};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ensemble node");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load config")?;

    let address = config.node.address.unwrap_or_else(LinkAddress::random);
    let transport = UdpTransport::bind(&config.network, address).context("Failed to open link")?;

    let mut node = Node::start(&config, Arc::new(transport), Arc::new(LoggingPlayback::new()))
        .context("Failed to start node")?;
    let controls = node.conductor().ok();

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    stats.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !run_command(line.trim(), &node, controls.as_ref()) {
                            break;
                        }
                    }
                    Ok(None) => {
                        // stdin closed; keep serving until Ctrl-C
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Console read failed: {}", e);
                        break;
                    }
                }
            }
            _ = stats.tick() => log_stats(&node),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received");
                break;
            }
        }
    }

    node.shutdown();
    Ok(())
}

/// Execute one console command; returns false to quit
fn run_command(line: &str, node: &NodeHandle, controls: Option<&ConductorControls>) -> bool {
    let mut parts = line.split_whitespace();
    let command = match parts.next() {
        Some(command) => command.to_ascii_lowercase(),
        None => return true,
    };
    let arg = parts.next();

    let result: Result<()> = match command.as_str() {
        "play" | "select" | "bank" | "stop" => match controls {
            None => Err(anyhow::anyhow!("only the conductor can {}", command)),
            Some(controls) => conductor_command(&command, arg, controls),
        },
        "rollcall" => {
            node.roll_call();
            Ok(())
        }
        "ready" => {
            node.send_ready();
            Ok(())
        }
        "peers" => {
            print_peers(node);
            Ok(())
        }
        "status" => serde_json::to_string_pretty(&node.status())
            .map(|json| println!("{}", json))
            .map_err(Into::into),
        "songs" => {
            print_songs();
            Ok(())
        }
        "help" => {
            print_help();
            Ok(())
        }
        "quit" | "exit" => return false,
        other => Err(anyhow::anyhow!("unknown command '{}', try 'help'", other)),
    };

    if let Err(e) = result {
        println!("error: {}", e);
    }
    true
}

fn conductor_command(command: &str, arg: Option<&str>, controls: &ConductorControls) -> Result<()> {
    match command {
        "play" => {
            let id = parse_song(arg)?;
            controls.start_song(id)?;
        }
        "select" => {
            let id = parse_song(arg)?;
            controls.select_song(id)?;
        }
        "bank" => {
            let bank: SongBank = arg
                .context("usage: bank <a|b|c>")?
                .parse()
                .map_err(anyhow::Error::msg)?;
            let id = controls.next_in_bank(bank)?;
            println!("bank {:?} -> {}", bank, songs::song(id).map(|s| s.name).unwrap_or("?"));
        }
        _ => controls.stop()?,
    }
    Ok(())
}

fn parse_song(arg: Option<&str>) -> Result<u8> {
    arg.context("missing song id")?
        .parse()
        .context("song id must be a number")
}

fn print_peers(node: &NodeHandle) {
    let status = node.status();
    println!("{} peer(s), {} online", status.peers.len(), status.online_peers);
    for peer in &status.peers {
        println!(
            "  {}  {:<10} {:<24} {:<8} {} ms ago",
            peer.address,
            peer.role.to_string(),
            peer.display_name,
            if peer.online { "online" } else { "offline" },
            peer.last_seen_ms_ago
        );
    }
}

fn print_songs() {
    for song in songs::SONGS.iter() {
        println!(
            "  {}  {:<20} {:?}, {} part(s), {:.1} s",
            song.id,
            song.name,
            song.kind,
            song.part_count(),
            song.duration_ms as f32 / 1000.0
        );
    }
}

fn print_help() {
    println!();
    println!("Commands:");
    println!("  play <id>      start a song (conductor)");
    println!("  bank <a|b|c>   start the next song of a bank (conductor)");
    println!("  select <id>    announce a selection (conductor)");
    println!("  stop           stop playback (conductor)");
    println!("  rollcall       ask every node to report");
    println!("  ready          broadcast a ready ping");
    println!("  peers          list known peers");
    println!("  status         node status as JSON");
    println!("  songs          list the catalog");
    println!("  quit");
    println!();
}

fn log_stats(node: &NodeHandle) {
    let dispatch = node.dispatch_stats();
    let link = node.transport_stats();
    let status = node.status();
    tracing::info!(
        "Stats: role={} offset={} us ({} heartbeats), {}/{} peers online, link sent={} failed={} received={} filtered={}, queued discovery={} control={}, dropped malformed={} full={}",
        status.role,
        status.clock_offset_us,
        status.heartbeats,
        status.online_peers,
        status.peers.len(),
        link.sent,
        link.send_failures,
        link.received,
        link.filtered,
        dispatch.discovery_enqueued,
        dispatch.control_enqueued,
        dispatch.discarded_malformed,
        dispatch.dropped_queue_full
    );
}
