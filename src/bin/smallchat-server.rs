use clap::Parser;
use config::Config;
use smallchat::{ChatServer, ServerConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing based on verbosity level. The server always logs at
/// least connections and relayed messages.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace", // 2 or more
    };

    let filter = format!("smallchat={level},smallchat_server={level}");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(author, version, about = "Simple chat server", long_about = None)]
struct Args {
    /// Address to bind server to (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Increase logging verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path (TOML format)
    #[arg(long)]
    config: Option<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Create config - load from file if specified, otherwise use defaults
    let config = if let Some(config_path) = &args.config {
        match Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
        {
            Ok(c) => c,
            Err(err) => {
                eprintln!("Failed to load config file '{config_path}': {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        Config::default()
    };

    let mut server_config = match ServerConfig::from_config(&config) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = args.bind {
        server_config.bind = bind;
    }

    let mut server = match ChatServer::new(&server_config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("Creating listening socket on {}: {err}", server_config.bind);
            return ExitCode::FAILURE;
        }
    };

    // Runs until the process is terminated.
    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Fatal server error: {err}");
            ExitCode::FAILURE
        }
    }
}
