//! CLI application for driving Hue lights from a timeline.
//!
//! Discovers a bridge, pairs with it, lists its lights and plays a timeline
//! file against them.
//!
//! Run with: cargo run --example hue_cli -- --help

use clap::{Parser, Subcommand};
use hue_timeline_rs::{
    BridgeClient, BridgeConnection, Brightness, Color, ConnectionStore, DEFAULT_APP_IDENTIFIER,
    DeviceRegistry, DiscoveryOptions, PairingOptions, PairingSession, StateUpdate, SyncEngine,
    SyncOptions, Track, discover_bridges,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hue-cli")]
#[command(about = "Drive Philips Hue lights from the command line", long_about = None)]
struct Cli {
    /// Directory holding the saved bridge connection
    #[arg(short, long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover bridges on the network
    Discover {
        /// SSDP listening window in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        timeout: u64,
    },

    /// Pair with a bridge (press its link button first)
    Pair {
        /// Bridge address (host or host:port)
        address: String,
        /// Device name appended to the app identifier
        #[arg(short, long, default_value = "cli")]
        device: String,
    },

    /// List the lights of the saved bridge
    Lights,

    /// Set one light
    Set {
        /// Light id
        light: String,
        /// Color as #RRGGBB
        color: String,
        /// Brightness (0-254)
        #[arg(short, long, default_value = "254")]
        brightness: u8,
    },

    /// Play a timeline (JSON array of tracks) against the saved bridge
    Play {
        /// Timeline file
        file: PathBuf,
        /// Tick period in milliseconds
        #[arg(short, long, default_value = "50")]
        tick: u64,
    },

    /// Forget the saved bridge
    Forget,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = ConnectionStore::in_dir(&cli.config_dir);

    match cli.command {
        Commands::Discover { timeout } => {
            println!("Discovering bridges (timeout: {}s)...", timeout);
            let options = DiscoveryOptions {
                multicast_window: Duration::from_secs(timeout),
                ..DiscoveryOptions::default()
            };

            let bridges = discover_bridges(&options).await;
            if bridges.is_empty() {
                println!("No bridge found on the network.");
            } else {
                println!("\nFound {} bridge(s):", bridges.len());
                for bridge in bridges {
                    println!("  {:21}  {}  {}", bridge.address, bridge.id, bridge.name);
                }
            }
        }

        Commands::Pair { address, device } => {
            let client = BridgeClient::new(&address)?;
            let name = client.get_config().await.ok().and_then(|c| c.name);
            println!("Press the link button on the bridge at {}...", address);

            let mut session = PairingSession::new(PairingOptions::default());
            let app_identifier = format!("{}#{}", DEFAULT_APP_IDENTIFIER, device);
            match session.pair(&client, &app_identifier).await {
                Ok(credential) => {
                    let mut connection = BridgeConnection::new(&address, name.as_deref());
                    connection.authenticate(&credential);
                    store.save(&connection)?;
                    println!("Paired, connection saved to {}", store.path().display());
                }
                Err(e) => eprintln!(
                    "Pairing failed after {} attempt(s) ({}): {}",
                    session.attempts(),
                    e.category(),
                    e
                ),
            }
        }

        Commands::Forget => {
            store.clear()?;
            println!("Saved bridge forgotten");
        }

        _ => {
            // All other commands need a paired bridge
            let connection = store
                .load()?
                .ok_or("No paired bridge. Run `pair <address>` first.")?;
            let client = BridgeClient::from_connection(&connection)?;

            match cli.command {
                Commands::Discover { .. } | Commands::Pair { .. } | Commands::Forget => {
                    unreachable!()
                }

                Commands::Lights => {
                    let mut registry = DeviceRegistry::new();
                    match registry.refresh(&client).await {
                        Ok(devices) => {
                            println!("\n{} light(s):", devices.len());
                            for d in devices {
                                println!(
                                    "  {:>3}  {:24}  {:3}  bri {:3}  color: {}  reachable: {}",
                                    d.id,
                                    d.name,
                                    if d.on { "ON" } else { "OFF" },
                                    d.brightness.value(),
                                    d.capabilities.supports_color,
                                    d.reachable
                                );
                            }
                        }
                        Err(e) => eprintln!("Error listing lights: {}", e),
                    }
                }

                Commands::Set {
                    light,
                    color,
                    brightness,
                } => {
                    let color = Color::from_str(&color)?;
                    let mut update = StateUpdate::new();
                    update
                        .power(true)
                        .brightness(Brightness::saturating(brightness.into()))
                        .xy(color.to_xy());

                    match client.set_light_state(&light, &update).await {
                        Ok(_) => println!("Light {} set to {}", light, color.to_hex()),
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }

                Commands::Play { file, tick } => {
                    let tracks: Vec<Track> = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
                    let end = tracks
                        .iter()
                        .flat_map(|t| &t.elements)
                        .map(|e| e.end_time())
                        .fold(0.0, f64::max);
                    println!("Playing {} track(s), {:.1}s...", tracks.len(), end);

                    let mut engine = SyncEngine::new(client, SyncOptions::default());
                    let mut registry = DeviceRegistry::new();
                    if let Err(e) = registry.refresh(engine.transport()).await {
                        eprintln!("Could not read light capabilities: {}", e);
                    }
                    engine.set_devices(registry.devices());

                    let start = tokio::time::Instant::now();
                    engine.on_seek(0.0, &tracks);
                    loop {
                        tokio::time::sleep(Duration::from_millis(tick)).await;
                        let t = start.elapsed().as_secs_f64();
                        engine.on_tick(t, &tracks);
                        if t > end {
                            break;
                        }
                    }
                    engine.flush().await;

                    let summary = engine.transport().history().await.summary();
                    println!(
                        "Done: {} request(s), {} error(s)",
                        summary.send_count, summary.error_count
                    );
                }
            }
        }
    }

    Ok(())
}
