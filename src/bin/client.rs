//! DriftQ command-line client.
//!
//! Each subcommand maps 1:1 to a request type: the client connects, writes
//! one request line, reads one response line, and pretty-prints it.

use clap::{Parser, Subcommand};
use driftq::wire::client::Client;
use driftq::wire::common::DEFAULT_PORT;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "DriftQ client")]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is up
    Ping,
    /// Create a topic with a fixed partition count
    CreateTopic {
        topic: String,
        #[arg(default_value_t = 3)]
        partitions: i64,
    },
    /// List topics with per-partition end offsets
    Topics,
    /// Append one record
    Produce {
        topic: String,
        key: String,
        value: String,
    },
    /// Read records from one partition
    Fetch {
        topic: String,
        partition: i64,
        offset: i64,
        #[arg(default_value_t = 10)]
        limit: i64,
    },
    /// Commit a consumer group's next offset
    Commit {
        group: String,
        topic: String,
        partition: i64,
        next_offset: i64,
    },
    /// Per-partition end offsets, committed offsets, and lag for a group
    GroupStats { group: String },
    /// Fetch from a group's committed offset, committing the new position
    FetchGroup {
        group: String,
        topic: String,
        partition: i64,
        #[arg(default_value_t = 10)]
        limit: i64,
        /// Skip the auto-commit after the fetch
        #[arg(long)]
        no_commit: bool,
    },
}

fn build_request(command: &Commands) -> Value {
    match command {
        Commands::Ping => json!({"type": "PING"}),
        Commands::CreateTopic { topic, partitions } => {
            json!({"type": "CREATE_TOPIC", "topic": topic, "partitions": partitions})
        }
        Commands::Topics => json!({"type": "TOPICS"}),
        Commands::Produce { topic, key, value } => {
            json!({"type": "PRODUCE", "topic": topic, "key": key, "value": value})
        }
        Commands::Fetch {
            topic,
            partition,
            offset,
            limit,
        } => json!({
            "type": "FETCH",
            "topic": topic,
            "partition": partition,
            "offset": offset,
            "limit": limit,
        }),
        Commands::Commit {
            group,
            topic,
            partition,
            next_offset,
        } => json!({
            "type": "COMMIT",
            "group": group,
            "topic": topic,
            "partition": partition,
            "next_offset": next_offset,
        }),
        Commands::GroupStats { group } => json!({"type": "GROUP_STATS", "group": group}),
        Commands::FetchGroup {
            group,
            topic,
            partition,
            limit,
            no_commit,
        } => json!({
            "type": "FETCH_GROUP",
            "group": group,
            "topic": topic,
            "partition": partition,
            "limit": limit,
            "auto_commit": !no_commit,
        }),
    }
}

fn main() {
    let cli = Cli::parse();

    let request = build_request(&cli.command);
    let client = Client::new("127.0.0.1", cli.port);

    match client.send(&request) {
        Ok(line) => match serde_json::from_str::<Value>(&line) {
            Ok(response) => println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or(line)
            ),
            Err(_) => println!("{line}"),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
