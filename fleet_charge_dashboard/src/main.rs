// CLI entry point for a dashboard client.
//
// Loads a fleet snapshot, connects to the relay, and runs the countdown.
// Operator commands come from stdin, one per line:
//   start | stop | toggle   control the countdown
//   status                  print one row per user with a vehicle
//   quit                    flush any partial assignment and exit
//
// Usage:
//   dashboard --fleet <FILE> [OPTIONS]
//     --fleet <FILE>       Fleet snapshot JSON (required)
//     --relay <ADDR>       Relay address (default: 127.0.0.1:4000)
//     --config <FILE>      Sim config JSON (default: built-in defaults)
//     --name <NAME>        Client name sent to the relay (default: dashboard)
//
// Logging goes through `tracing`; set `RUST_LOG` to adjust (default `info`).

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use fleet_charge_dashboard::{BridgeConfig, BridgeError, Command, DashboardBridge};
use fleet_charge_sim::{Dashboard, Fleet, FleetSnapshot, SimConfig, VehicleRow};
use tracing_subscriber::EnvFilter;

struct Args {
    fleet: PathBuf,
    config: Option<PathBuf>,
    bridge: BridgeConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let bridge = match connect(&args) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("Failed to start dashboard: {e}");
            std::process::exit(1);
        }
    };
    println!("Dashboard connected as {}", bridge.client_id());
    print_rows(&bridge.rows());

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() || command == Command::Quit {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
        let _ = tx.send(Command::Quit);
    });

    bridge.run(&rx, print_rows);
}

fn connect(args: &Args) -> Result<DashboardBridge, BridgeError> {
    let snapshot = FleetSnapshot::load(&args.fleet)?;
    let config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    let dashboard = Dashboard::new(Fleet::load(&snapshot), config);
    DashboardBridge::connect(&args.bridge, dashboard)
}

fn print_rows(rows: &[VehicleRow]) {
    if rows.is_empty() {
        println!("(no vehicles)");
    }
    for row in rows {
        println!(
            "{:<20} {:<20} charge {:>7.2}  drain {:>5.2}/tick  {}",
            row.user_name, row.vehicle_name, row.charge, row.drain_rate, row.capacity
        );
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut fleet = None;
    let mut config = None;
    let mut bridge = BridgeConfig::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--fleet" => {
                i += 1;
                fleet = Some(PathBuf::from(required(&args, i, "--fleet requires a file")));
            }
            "--relay" => {
                i += 1;
                bridge.relay_address = required(&args, i, "--relay requires an address");
            }
            "--config" => {
                i += 1;
                config = Some(PathBuf::from(required(&args, i, "--config requires a file")));
            }
            "--name" => {
                i += 1;
                bridge.client_name = required(&args, i, "--name requires a value");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(fleet) = fleet else {
        eprintln!("--fleet is required");
        print_usage();
        std::process::exit(1);
    };
    Args {
        fleet,
        config,
        bridge,
    }
}

fn required(args: &[String], i: usize, message: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{message}");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: dashboard --fleet <FILE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --fleet <FILE>       Fleet snapshot JSON (required)");
    println!("  --relay <ADDR>       Relay address (default: 127.0.0.1:4000)");
    println!("  --config <FILE>      Sim config JSON");
    println!("  --name <NAME>        Client name (default: dashboard)");
    println!("  --help, -h           Show this help");
    println!();
    println!("Commands on stdin: start, stop, toggle, status, quit");
}
