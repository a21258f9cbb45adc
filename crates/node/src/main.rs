//! Shard Fallback Node
//!
//! Runs a local fallback round: a shard elects a leader, co-signs a fallback
//! block, and this node verifies it and moves its DS committee over to the
//! shard. Afterwards the node re-enters PoW and watches for the next
//! fallback timeout.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fallback_consensus::{
    cosign_fallback_block, encode_fallback_message, BlsKeypair, CommitteeStore,
    FallbackBlockHeader, FallbackProcessor, FallbackProcessorBuilder, FallbackTimeout, Member,
    NetworkAddress, NodeMode, NodeState, ProtocolState, ShardDirectory, MESSAGE_BODY_OFFSET,
};
use node_runtime::{Account, NodeRuntime, RoundEvent, Transaction};
use rand::RngCore;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{NodeConfig, DS_BASE_PORT};

/// Node mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Full shard node - clears round state and re-enters PoW
    Full,
    /// Lookup node - only tracks the DS committee
    Lookup,
}

impl From<Mode> for NodeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => NodeMode::Full,
            Mode::Lookup => NodeMode::Lookup,
        }
    }
}

/// Shard fallback node
#[derive(Parser, Debug)]
#[command(name = "fallback-node")]
#[command(
    about = "Verifies shard fallback blocks and reconstitutes the DS committee",
    long_about = None
)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node mode (full or lookup)
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Current epoch
    #[arg(long)]
    epoch: Option<u64>,

    /// Number of shards
    #[arg(long)]
    shard_count: Option<usize>,

    /// Members per shard
    #[arg(long)]
    shard_size: Option<usize>,

    /// Number of co-signers of the fallback block
    #[arg(long)]
    signers: Option<usize>,

    /// Consensus id of the fallback leader
    #[arg(long)]
    leader_index: Option<u32>,

    /// Grace period for early fallback blocks, in seconds
    #[arg(long)]
    fallback_extra_time: Option<u64>,

    /// Fallback timeout interval, in seconds
    #[arg(long)]
    fallback_interval: Option<u64>,

    /// Exit after the fallback block is processed
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(epoch) = self.epoch {
            config.epoch = epoch;
        }
        if let Some(shard_count) = self.shard_count {
            config.shard_count = shard_count;
        }
        if let Some(shard_size) = self.shard_size {
            config.shard_size = shard_size;
        }
        if let Some(signers) = self.signers {
            config.signers = signers;
        }
        if let Some(leader_index) = self.leader_index {
            config.leader_index = leader_index;
        }
        if let Some(secs) = self.fallback_extra_time {
            config.fallback.fallback_extra_time_secs = secs;
        }
        if let Some(secs) = self.fallback_interval {
            config.fallback.fallback_interval_waiting_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

/// A generated node identity
struct Identity {
    keypair: BlsKeypair,
    member: Member,
}

fn generate_identities(count: usize, base_port: u16) -> Result<Vec<Identity>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| -> Result<Identity> {
            let port = u16::try_from(i)
                .ok()
                .and_then(|offset| base_port.checked_add(offset))
                .with_context(|| format!("no port for member {} above {}", i, base_port))?;
            let mut ikm = [0u8; 32];
            rng.fill_bytes(&mut ikm);
            let keypair = BlsKeypair::from_ikm(&ikm)?;
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            let member = Member::new(keypair.public_key(), NetworkAddress::from(addr));
            Ok(Identity { keypair, member })
        })
        .collect()
}

/// Seed accounts and leave in-flight round state behind for the fallback to clear
fn seed_runtime(runtime: &NodeRuntime, epoch: u64) -> Result<()> {
    let treasury = [0xAAu8; 20];
    let player = [0xBBu8; 20];
    runtime.accounts.store_account(treasury, Account { balance: 1_000_000, nonce: 0 });

    runtime
        .accounts
        .apply_transfer(&treasury, &player, 250)
        .context("seed transfer failed")?;
    let tx = Transaction {
        from: treasury,
        to: player,
        amount: 250,
        nonce: 0,
    };
    tracing::debug!("Seeded in-flight transaction {:02x?}", &tx.hash()[..8]);
    runtime.tx_pool.record_processed(epoch, tx.clone());
    runtime.tx_pool.add_created(tx);
    runtime.tx_pool.buffer_microblock_message(1, vec![0u8; 64]);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.node_config()?;
    run_node(config, args.once).await
}

async fn run_node(config: NodeConfig, once: bool) -> Result<()> {
    tracing::info!("Starting shard fallback node - {:?} mode", config.mode);
    tracing::info!("  Epoch: {}", config.epoch);
    tracing::info!("  Shards: {} x {} members", config.shard_count, config.shard_size);
    tracing::info!(
        "  Fallback shard: {} (leader {}, {} signers)",
        config.fallback_shard,
        config.leader_index,
        config.signers
    );
    tracing::info!("  Grace period: {:?}", config.fallback.grace_period());
    tracing::info!("  Fallback interval: {:?}", config.fallback.fallback_interval());

    // Shard directory and the stalled DS committee
    let mut shard_identities = Vec::with_capacity(config.shard_count);
    for shard in 0..config.shard_count {
        shard_identities.push(generate_identities(
            config.shard_size,
            config.shard_base_port(shard),
        )?);
    }
    let ds_identities = generate_identities(config.shard_size, DS_BASE_PORT)?;

    let shards = ShardDirectory::new(
        shard_identities
            .iter()
            .map(|ids| ids.iter().map(|id| id.member.clone()).collect())
            .collect(),
    );
    let committee =
        CommitteeStore::with_members(ds_identities.iter().map(|id| id.member.clone()).collect());

    let node_state = Arc::new(NodeState::new(
        config.mode,
        config.epoch,
        ProtocolState::WaitingFinalBlock,
    ));

    let (runtime, round_events) = NodeRuntime::new(node_state.clone());
    seed_runtime(&runtime, config.epoch)?;

    let (processor, timeouts) = FallbackProcessorBuilder::new(
        node_state.clone(),
        committee.clone(),
        shards,
        runtime.services(),
    )
    .config(config.fallback.clone())
    .build();
    let processor = Arc::new(processor);

    // The fallback shard co-signs a block electing its leader
    let shard = &shard_identities[config.fallback_shard as usize];
    let leader = &shard[config.leader_index as usize].member;
    let header = FallbackBlockHeader {
        fallback_epoch_no: config.epoch,
        shard_id: config.fallback_shard,
        leader_consensus_id: config.leader_index,
        leader_pub_key: leader.public_key,
        leader_network_info: leader.network_address,
        state_root_hash: runtime.accounts.state_root_hash(),
    };
    let signers: Vec<(usize, &BlsKeypair)> = shard
        .iter()
        .take(config.signers)
        .enumerate()
        .map(|(i, id)| (i, &id.keypair))
        .collect();
    let block = cosign_fallback_block(header, config.shard_size, &signers, &signers)?;
    let message = encode_fallback_message(&block);
    tracing::info!(
        "Fallback block for epoch {} composed: {} bytes, leader {}",
        config.epoch,
        message.len(),
        leader
    );

    // The block arrives before the node finishes waiting for the final block
    let transition_state = node_state.clone();
    let delay = Duration::from_millis(config.state_transition_delay_ms);
    let transition = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::info!("No final block, waiting for fallback block");
        transition_state.set_state(ProtocolState::WaitingFallbackBlock);
    });

    let handler = processor.clone();
    let from = leader.network_address;
    let accepted = tokio::task::spawn_blocking(move || {
        handler.handle(&message, MESSAGE_BODY_OFFSET, &from)
    })
    .await?;
    transition.await?;

    if !accepted {
        tracing::error!("Fallback block rejected, DS committee unchanged");
        return Ok(());
    }

    log_committee(&processor);
    if let Ok(RoundEvent::StartPow { fallback_epoch }) = round_events.try_recv() {
        tracing::info!("PoW started after fallback of epoch {}", fallback_epoch);
    }
    tracing::info!(
        "Working snapshot reset, state root {}",
        runtime.accounts.state_root_hash()
    );

    if once {
        return Ok(());
    }

    tracing::info!("Watching for fallback timeout. Press Ctrl+C to stop.");
    let watchdog = tokio::task::spawn_blocking(move || wait_for_timeout(timeouts));

    tokio::select! {
        result = watchdog => {
            match result? {
                Some(timeout) => tracing::warn!(
                    "Fallback timeout for epoch {}, another fallback round is needed",
                    timeout.epoch
                ),
                None => tracing::info!("Fallback timer stopped"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    processor.timer().cancel();
    let stats = processor.stats();
    tracing::info!(
        "Node stopped: {} accepted, {} rejected fallback blocks",
        stats.accepted,
        stats.rejected
    );

    Ok(())
}

fn wait_for_timeout(
    timeouts: crossbeam_channel::Receiver<FallbackTimeout>,
) -> Option<FallbackTimeout> {
    timeouts.recv().ok()
}

fn log_committee(processor: &FallbackProcessor) {
    let members = processor.committee().snapshot();
    tracing::info!("DS committee reconstituted ({} members):", members.len());
    for (i, member) in members.iter().enumerate() {
        tracing::info!("  [{}] {}", i, member);
    }
}
