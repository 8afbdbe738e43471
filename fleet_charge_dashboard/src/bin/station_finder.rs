// CLI entry point for a station finder.
//
// Connects to the relay and answers every `location` request with a
// `filteredlocations` reply from a station directory file.
//
// Usage:
//   station_finder --stations <FILE> [--relay <ADDR>]
//
// Runs until the relay closes the connection.

use fleet_charge_dashboard::{BridgeConfig, StationFinder};
use fleet_charge_sim::StationDirectory;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut stations = None;
    let mut config = BridgeConfig::with_name("station_finder");
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--stations" => {
                i += 1;
                stations = args.get(i).cloned();
            }
            "--relay" => {
                i += 1;
                if let Some(addr) = args.get(i) {
                    config.relay_address = addr.clone();
                }
            }
            "--help" | "-h" => {
                println!("Usage: station_finder --stations <FILE> [--relay <ADDR>]");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(path) = stations else {
        eprintln!("--stations <FILE> is required");
        std::process::exit(1);
    };
    let directory = match StationDirectory::load(&path) {
        Ok(directory) => directory,
        Err(e) => {
            eprintln!("Failed to load stations: {e}");
            std::process::exit(1);
        }
    };
    let finder = match StationFinder::connect(&config, directory) {
        Ok(finder) => finder,
        Err(e) => {
            eprintln!("Failed to connect to relay: {e}");
            std::process::exit(1);
        }
    };
    println!("Station finder connected to {}", config.relay_address);
    finder.run();
}
