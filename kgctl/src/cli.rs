//! CLI argument definitions for the CYBERON MCP server.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "kgctl")]
#[command(about = "CYBERON ontology graph MCP server")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Configuration file path (YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to a persisted ontology document to load at startup (an empty
    /// in-memory graph is used if omitted)
    #[arg(short, long)]
    pub data_file: Option<PathBuf>,

    /// Transport binding to serve on
    #[arg(short, long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Named-pipe transport: path of the inbound FIFO
    #[arg(long)]
    pub named_pipe_in: Option<PathBuf>,

    /// Named-pipe transport: path of the outbound FIFO
    #[arg(long)]
    pub named_pipe_out: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    NamedPipe,
}
