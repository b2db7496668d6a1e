//! The command-line surface (§6 "CLI surface"), matching the teacher's
//! derive-based `Cli` struct shape.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Verbose,
    Info,
    Warning,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "catena", author, version, about = "A permissioned blockchain whose payload is SQL", long_about = None)]
pub struct Cli {
    /// Chain-state database file. Ignored if `--in-memory-database` is set.
    #[arg(short = 'd', long, default_value = "catena.sqlite")]
    pub database: String,

    /// Use a `:memory:` chain-state database instead of a file.
    #[arg(long)]
    pub in_memory_database: bool,

    /// Genesis seed for a freshly initialized chain.
    #[arg(short = 's', long)]
    pub seed: Option<String>,

    /// Gossip listen port.
    #[arg(short = 'p', long, default_value_t = 8338)]
    pub gossip_port: u16,

    /// Query endpoint listen port. Defaults to `gossip_port + 1`.
    #[arg(short = 'q', long)]
    pub query_port: Option<u16>,

    /// Peer URLs to dial on startup.
    #[arg(short = 'j', long = "join")]
    pub join: Vec<String>,

    /// Mine new blocks from the mempool.
    #[arg(short = 'm', long)]
    pub mine: bool,

    /// Truncate the chain database and the peer table before starting.
    #[arg(short = 'i', long)]
    pub initialize: bool,

    /// Skip reapplying the replay queue against the permanent store on startup.
    #[arg(short = 'n', long)]
    pub no_replay: bool,

    /// Node database file (peers, persisted identity).
    #[arg(long, default_value = "catena-node.sqlite")]
    pub node_database: String,

    /// Override the node's persisted UUID.
    #[arg(long)]
    pub node_uuid: Option<uuid::Uuid>,

    /// Disable local-network peer discovery.
    #[arg(long)]
    pub no_local_discovery: bool,

    /// Disable the bundled web client.
    #[arg(long)]
    pub no_web_client: bool,

    /// Disable the Postgres-wire query server.
    #[arg(long)]
    pub no_pq_server: bool,

    /// Print this node's public key and UUID, then exit.
    #[arg(long)]
    pub show_identity: bool,

    /// Additional CORS origins allowed by the query endpoint.
    #[arg(long = "allow-domain")]
    pub allow_domain: Vec<String>,

    /// Log verbosity.
    #[arg(short = 'v', long = "log", value_enum, default_value = "info")]
    pub log: LogLevel,
}

impl Cli {
    /// `-q` defaults to one above `-p` when not given explicitly (§6).
    pub fn resolved_query_port(&self) -> u16 {
        self.query_port.unwrap_or(self.gossip_port + 1)
    }

    pub fn resolved_database_path(&self) -> String {
        if self.in_memory_database {
            ":memory:".to_string()
        } else {
            self.database.clone()
        }
    }
}
