//! DriftQ server binary.
//!
//! Thin bootstrap: parses the port and data directory, initializes
//! telemetry, opens the store, and hands off to the wire server.

use driftq::wire::common::DEFAULT_PORT;
use driftq::wire::server::start_server;
use driftq::{telemetry, Store};
use std::env;
use std::sync::Arc;

fn main() {
    telemetry::init();

    let args: Vec<String> = env::args().collect();

    let mut port = DEFAULT_PORT;
    let mut data_dir = std::path::PathBuf::from("./data");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --data-dir requires a path");
                    print_usage();
                    std::process::exit(1);
                }
                data_dir = std::path::PathBuf::from(&args[i]);
            }
            arg => {
                if let Ok(p) = arg.parse::<u16>() {
                    port = p;
                } else {
                    eprintln!("Error: Invalid argument '{arg}'");
                    print_usage();
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }

    let store = match Store::open(&data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: Failed to open store in {}: {e}", data_dir.display());
            std::process::exit(1);
        }
    };

    if let Err(e) = start_server(port, store) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage: server [port] [--data-dir <path>]");
    eprintln!("  port: Port number to bind to (default: {DEFAULT_PORT})");
    eprintln!("  --data-dir: Directory for topic logs and committed offsets (default: ./data)");
}
