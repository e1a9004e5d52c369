use clap::Parser;
use config::Config;
#[cfg(unix)]
use smallchat::terminal::{SharedLine, TerminalGuard, TerminalInput, TerminalOutput};
use smallchat::{ChatClient, ClientConfig, ClientExit, Error};
use std::io;
#[cfg(unix)]
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing based on verbosity level. Logs go to stderr so they do
/// not mix with the chat on stdout.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => return, // No tracing
        1 => "info",
        2 => "debug",
        _ => "trace", // 3 or more
    };

    let filter = format!("smallchat={level}");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about = "Simple chat client", long_about = None)]
struct Args {
    /// Server address to connect to (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,

    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path (TOML format)
    #[arg(long)]
    config: Option<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Runs the client on stdin/stdout. An interactive terminal is switched to
/// raw mode and edited locally.
fn run_client(client: &mut ChatClient) -> Result<ClientExit, Error> {
    #[cfg(unix)]
    if io::stdin().is_terminal() {
        let _guard = TerminalGuard::enter_raw_mode();
        let line = SharedLine::default();
        let input = TerminalInput::new(io::stdin(), io::stdout(), line.clone());
        let mut output = TerminalOutput::new(io::stdout(), line);
        return client.run(io::BufReader::new(input), &mut output);
    }

    client.run(io::BufReader::new(io::stdin()), &mut io::stdout())
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

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

    let mut client_config = match ClientConfig::from_config(&config) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(server) = args.server {
        client_config.server = server;
    }

    let mut client = match ChatClient::connect(&client_config) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("Connecting to server {}: {err}", client_config.server);
            return ExitCode::FAILURE;
        }
    };

    match run_client(&mut client) {
        Ok(ClientExit::InputClosed) => ExitCode::SUCCESS,
        Ok(ClientExit::ServerClosed) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Client error: {err}");
            ExitCode::FAILURE
        }
    }
}
