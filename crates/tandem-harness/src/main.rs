//! Tandem simulation binary.
//!
//! Runs seeded rounds of random concurrent edits against one hub and checks
//! that every replica converges.
//!
//! # Usage
//!
//! ```bash
//! # Live delivery, random seed (logged)
//! tandem-sim --peers 3 --rounds 50
//!
//! # Stepped delivery with manual commits, replaying a seed
//! tandem-sim --debug --seed 42 --log-level debug
//! ```

use clap::Parser;
use tandem_core::fixtures;
use tandem_harness::{Scenario, ScenarioConfig, SimPeer, workload::Workload};
use tandem_hub::HubConfig;
use tandem_proto::PeerId;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tandem sync simulator
#[derive(Parser, Debug)]
#[command(name = "tandem-sim")]
#[command(about = "Deterministic collaborative editing simulation")]
#[command(version)]
struct Args {
    /// Step messages one at a time with manual commits
    #[arg(long)]
    debug: bool,

    /// RNG seed. Random if omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Number of edit rounds
    #[arg(long, default_value = "20")]
    rounds: usize,

    /// Number of peers
    #[arg(long, default_value = "2")]
    peers: usize,

    /// Maximum changesets per catch-up reply
    #[arg(long, default_value = "100")]
    catch_up_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let seed = match args.seed {
        Some(seed) => seed,
        None => random_seed().map_err(|err| format!("seed generation failed: {err}"))?,
    };
    tracing::info!(
        seed,
        debug = args.debug,
        peers = args.peers,
        rounds = args.rounds,
        "simulation starting"
    );

    let config = ScenarioConfig {
        peers: (1..=args.peers).map(|i| PeerId::new(format!("user{i}"))).collect(),
        seed: if args.peers > 2 { fixtures::poem() } else { fixtures::two_paragraphs() },
        debug: args.debug,
        rng_seed: seed,
        hub: HubConfig { catch_up_limit: args.catch_up_limit },
        ..ScenarioConfig::default()
    };
    let mut scenario = Scenario::new(config)?;
    let mut workload = Workload::with_seed(seed.rotate_left(32));

    for round in 0..args.rounds {
        if scenario.is_debug() {
            stepped_round(&scenario, &mut workload)?;
        } else {
            live_round(&scenario, &mut workload)?;
        }
        tracing::debug!(round, in_flight = scenario.queue().len(), "round complete");
    }

    if scenario.is_debug() {
        scenario.toggle_debug();
    }
    for peer in scenario.peers() {
        peer.start();
    }
    let settled = scenario.settle();

    let stats = scenario.queue().stats();
    tracing::info!(
        delivered = stats.delivered,
        dropped = stats.dropped,
        version = scenario.hub_version(),
        settled,
        "simulation finished"
    );

    let document = scenario.hub_document()?;
    for (node, text) in document.paragraphs() {
        tracing::info!(node, text, "paragraph");
    }

    if !scenario.is_converged() {
        for peer in scenario.peers() {
            tracing::error!(
                peer = %peer.id(),
                version = peer.version(),
                document = ?peer.document(),
                "replica"
            );
        }
        return Err(format!("replicas diverged (seed {seed})").into());
    }

    tracing::info!(seed, "replicas converged");
    Ok(())
}

/// Edits with manual commits; a random number of messages is delivered
/// between peers' turns.
fn stepped_round(
    scenario: &Scenario,
    workload: &mut Workload,
) -> Result<(), Box<dyn std::error::Error>> {
    for index in 0..scenario.peers().len() {
        let peer = scenario.peer(index)?;
        random_edit(peer, workload)?;
        if workload.chance(0.5) {
            scenario.commit(index)?;
        }

        for _ in 0..workload.pick(scenario.peers().len() * 2 + 1) {
            scenario.process_next_message();
        }
    }
    Ok(())
}

/// Edits with automatic commits; peers are frozen and thawed at random so
/// their commits race.
fn live_round(
    scenario: &Scenario,
    workload: &mut Workload,
) -> Result<(), Box<dyn std::error::Error>> {
    for peer in scenario.peers() {
        if peer.is_stopped() {
            if workload.chance(0.4) {
                peer.start();
            }
        } else if workload.chance(0.15) {
            peer.stop();
        }
        random_edit(peer, workload)?;
    }
    Ok(())
}

fn random_edit(peer: &SimPeer, workload: &mut Workload) -> Result<(), Box<dyn std::error::Error>> {
    if workload.chance(0.6) {
        let op = workload.next_edit(peer.id(), &peer.document());
        peer.edit(vec![op])?;
    }
    Ok(())
}

fn random_seed() -> Result<u64, getrandom::Error> {
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}
