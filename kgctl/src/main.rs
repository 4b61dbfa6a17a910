//! Process entry point for the CYBERON ontology graph MCP server.
//!
//! Loads a persisted ontology document (or starts empty), assembles the
//! [`cyberon_mcp::Server`], attaches the transport selected on the command
//! line, and runs until the transport closes or a shutdown signal arrives.

use std::process;
use std::sync::Arc;

use clap::Parser;
use cyberon_core::QueryEngine;
use cyberon_mcp::transport::{NamedPipe, StandardStream};
use cyberon_mcp::Server;
use tracing::{error, info, Level};

mod cli;
mod config;

use cli::{Cli, TransportKind};
use config::ServerConfig;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };
    let config = config.with_overrides(&args);

    let engine = match &config.data_file {
        Some(path) => match QueryEngine::load_from_path(path) {
            Ok(engine) => {
                info!(path = %path.display(), "loaded ontology document");
                engine
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load ontology document");
                process::exit(1);
            }
        },
        None => {
            info!("no data file given, starting with an empty ontology");
            QueryEngine::empty()
        }
    };

    let server = Server::new(engine);

    match config.transport {
        TransportKind::Stdio => {
            server.add_transport(Arc::new(StandardStream::new("stdio"))).await;
        }
        TransportKind::NamedPipe => {
            server
                .add_transport(Arc::new(NamedPipe::new(
                    "named-pipe",
                    config.named_pipe_in.clone(),
                    config.named_pipe_out.clone(),
                )))
                .await;
        }
    }

    let failures = server.start().await;
    for (id, err) in &failures {
        error!(transport_id = %id, error = %err, "transport failed to start");
    }
    if !failures.is_empty() {
        process::exit(1);
    }

    info!(transport = ?config.transport, "cyberon MCP server running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal: {e}");
    }

    info!("shutting down");
    server.stop().await;
}
