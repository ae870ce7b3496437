// identity-gate-mcp/src/bin/identity-gate-mcp.rs
// ============================================================================
// Module: Identity Gate Entry Point
// Description: Binary entry point selecting the configured transport.
// Purpose: Load configuration, wire the gateway, and serve until shutdown.
// Dependencies: clap, identity-gate-mcp, tokio
// ============================================================================

//! ## Overview
//! The binary loads and validates configuration, then serves the gateway on
//! the configured transport. Stdio runs synchronously on the main thread;
//! HTTP starts a tokio runtime. Failures print one line to stderr and exit
//! nonzero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use identity_gate_mcp::GatewayConfig;
use identity_gate_mcp::GatewayServer;
use identity_gate_mcp::ServerTransport;

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Identity gateway over stdio or HTTP.
#[derive(Debug, Parser)]
#[command(name = "identity-gate-mcp", version, about)]
struct Cli {
    /// Path to the gateway configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            #[allow(clippy::print_stderr, reason = "Fatal errors belong on stderr.")]
            {
                eprintln!("identity-gate-mcp: {message}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration and serves the selected transport.
fn run(cli: &Cli) -> Result<(), String> {
    let config = GatewayConfig::load(cli.config.as_deref()).map_err(|err| err.to_string())?;
    let server = GatewayServer::from_config(&config).map_err(|err| err.to_string())?;
    match config.server.transport {
        ServerTransport::Stdio => {
            let shutdown = AtomicBool::new(false);
            let stdin = io::stdin();
            let stdout = io::stdout();
            server
                .serve_stdio(stdin.lock(), stdout.lock(), &shutdown)
                .map_err(|err| err.to_string())
        }
        ServerTransport::Http => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| err.to_string())?;
            runtime
                .block_on(Arc::new(server).serve_http())
                .map_err(|err| err.to_string())
        }
    }
}
