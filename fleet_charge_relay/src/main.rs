// CLI entry point for the fleet-charge relay hub.
//
// Starts a standalone hub that dashboards, station finders and viewers
// connect to. The hub only relays; it never runs the countdown.
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>          Listen port (default: $PORT, else 4000)
//     --bind <ADDR>          Bind address (default: 127.0.0.1)
//     --max-clients <N>      Max concurrent subscribers (default: 64)
//
// Logging goes through `tracing`; set `RUST_LOG` to adjust (default `info`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fleet_charge_relay::server::{RelayConfig, start_relay};
use tracing_subscriber::EnvFilter;

static RUNNING: AtomicBool = AtomicBool::new(true);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();
    install_signal_handlers();

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };
    println!("Server running on {addr}");

    while RUNNING.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("Shutting down...");
    handle.stop();
}

/// Parse command-line flags on top of `RelayConfig::from_env()`. Plain
/// `std::env::args()` matching; flags win over `PORT`.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::from_env();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--bind" => {
                i += 1;
                config.bind_address = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--bind requires an address");
                    std::process::exit(1);
                });
            }
            "--max-clients" => {
                i += 1;
                config.max_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--max-clients requires a valid number");
                    std::process::exit(1);
                });
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

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>          Listen port (default: $PORT, else 4000)");
    println!("  --bind <ADDR>          Bind address (default: 127.0.0.1)");
    println!("  --max-clients <N>      Max concurrent subscribers (default: 64)");
    println!("  --help, -h             Show this help");
}

#[cfg(unix)]
extern "C" fn on_signal(_signum: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Route SIGINT/SIGTERM to a graceful hub stop.
#[cfg(unix)]
fn install_signal_handlers() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: `on_signal` only performs an atomic store, which is
    // async-signal-safe, and has the signature `signal` expects.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {
    // The default Ctrl+C behavior terminates the process, which tears the
    // hub down with it.
}
