//! The `catena` node binary (§6 "CLI surface"). Thin by design: parses the
//! CLI, wires up persisted identity and the chain-state backend, constructs
//! a [`catena_node::Node`], and runs its 2-second scheduler tick until a
//! shutdown signal arrives. The query endpoint, the Postgres-wire server,
//! and gossip transport itself are out of scope (§1) — this binary defines
//! the flags for them but never opens a socket.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use catena_config::{Cli, LogLevel, NodeDatabase};
use catena_ledger::{Block, PermanentStore, INITIAL_DIFFICULTY};
use catena_node::{Mempool, Miner, Node};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: LogLevel) {
    let directive = match level {
        LogLevel::Debug => "debug",
        LogLevel::Verbose => "trace",
        LogLevel::Info => "info",
        LogLevel::Warning => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive)))
        .init();
}

/// §6 `--initialize`: truncates the peer table and drops the chain-state
/// file entirely, so the next open starts from a clean schema.
async fn initialize(node_db: &NodeDatabase, chain_db_path: &str) -> anyhow::Result<()> {
    node_db.truncate_peers().await?;
    if chain_db_path != ":memory:" {
        let _ = tokio::fs::remove_file(chain_db_path).await;
    }
    Ok(())
}

/// Mines this node's own genesis block from the persisted seed and feeds it
/// straight into the ledger — the bootstrap path for the first node on a
/// fresh chain, called only when the permanent store has never committed
/// anything. A node joining an existing chain instead picks up genesis (and
/// everything after it) from its peers via the ordinary `query`/`fetch`
/// exchange once gossip transport is wired in.
async fn bootstrap_genesis(node: &Node, miner_hash: catena_types::Hash, seed: &str) -> anyhow::Result<()> {
    let mut genesis = Block::genesis_unsigned(seed.to_string(), miner_hash, current_unix_time());
    genesis.mine(INITIAL_DIFFICULTY, &AtomicBool::new(false));
    node.receive_block(genesis).await.context("failed to apply the mined genesis block")?;
    Ok(())
}

fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// §4.11: mines continuously while `--mine` is set, broadcasting each
/// successfully mined block and feeding it back into the ledger. Runs until
/// the whole process is torn down; an in-progress attempt is abandoned (not
/// explicitly aborted) once the task is dropped at shutdown.
async fn mining_loop(node: Arc<Node>) {
    loop {
        let Some(block) = node.miner.mine_next(&node.ledger, INITIAL_DIFFICULTY).await else {
            continue;
        };
        match node.receive_block(block.clone()).await {
            Ok(_) => node.broadcast_mined(&block).await,
            Err(error) => tracing::warn!(%error, "mined block rejected by our own ledger"),
        }
    }
}

/// §4.11's scheduler: one tick every two seconds until shutdown.
async fn scheduler_loop(node: Arc<Node>) {
    let mut interval = tokio::time::interval(catena_node::TICK_INTERVAL);
    loop {
        interval.tick().await;
        node.tick().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("installing a SIGTERM handler should never fail");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received shutdown signal, shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log);

    let node_db = NodeDatabase::open(&cli.node_database).await.context("opening the node database")?;
    let chain_db_path = cli.resolved_database_path();

    if cli.initialize {
        initialize(&node_db, &chain_db_path).await.context("--initialize")?;
    }

    let identity = node_db
        .load_or_create_identity(cli.node_uuid, cli.seed.clone())
        .await
        .context("loading persisted node identity")?;

    if cli.show_identity {
        println!("uuid: {}", identity.uuid);
        println!("public key: {}", identity.key_pair.public_key().to_hex());
        return Ok(());
    }

    tracing::info!(uuid = %identity.uuid, public_key = %identity.key_pair.public_key().to_hex(), "node identity");

    let permanent = PermanentStore::open(&chain_db_path).await.context("opening the chain-state database")?;
    let needs_genesis = !cli.no_replay && permanent.head_index().await?.is_none();

    let genesis_seed = identity.genesis_seed.clone();
    let mempool = Arc::new(Mempool::new());
    let miner = Miner::new(identity.key_pair, mempool);
    let miner_hash = miner.miner_hash();
    let node = Arc::new(Node::new(identity.uuid, miner, permanent));

    if needs_genesis {
        bootstrap_genesis(&node, miner_hash, &genesis_seed).await?;
    }

    tracing::info!(
        gossip_port = cli.gossip_port,
        query_port = cli.resolved_query_port(),
        mine = cli.mine,
        join = ?cli.join,
        "catena node starting; gossip transport and the query endpoint are not wired in this build"
    );

    let scheduler = tokio::spawn(scheduler_loop(node.clone()));
    let miner_task = cli.mine.then(|| tokio::spawn(mining_loop(node.clone())));

    wait_for_shutdown_signal().await;

    scheduler.abort();
    if let Some(task) = miner_task {
        task.abort();
    }
    Ok(())
}
