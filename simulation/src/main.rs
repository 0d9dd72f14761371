//! Scenario runner: random contact churn over a configurable host
//! population, with run statistics printed as JSON.

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use opportune_core::message::{HostId, Recipients};
use opportune_routing::drop_policy::DropPolicyKind;
use opportune_routing::policy::RouterKind;

use opportune_simulation::events::{ExternalEvent, MessageEvent};
use opportune_simulation::scenario::ScenarioConfig;
use opportune_simulation::stats::SimStats;
use opportune_simulation::world::World;

#[derive(Debug, Parser)]
#[command(name = "opportune", about = "Opportunistic network simulation")]
struct Args {
    /// Number of hosts.
    #[arg(long, default_value_t = 10)]
    hosts: usize,

    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 3600.0)]
    duration: f64,

    /// Regular tick interval in seconds.
    #[arg(long, default_value_t = 1.0)]
    tick: f64,

    /// Per-host buffer capacity in bytes.
    #[arg(long, default_value_t = 1_000_000)]
    buffer: u64,

    /// Link speed in bytes per second.
    #[arg(long, default_value_t = 250_000)]
    speed: u64,

    /// Message TTL in seconds (unset: messages never expire).
    #[arg(long)]
    ttl: Option<f64>,

    /// Drop policy: fifo, mofo, shli or passive.
    #[arg(long, default_value = "fifo")]
    drop_policy: String,

    /// Router: epidemic, predictability, cost or disaster.
    #[arg(long, default_value = "epidemic")]
    router: String,

    /// Number of randomly generated unicast messages.
    #[arg(long, default_value_t = 100)]
    messages: u32,

    /// Message size in bytes.
    #[arg(long, default_value_t = 100_000)]
    message_size: u64,

    /// Per-tick probability that a host pair changes range state.
    #[arg(long, default_value_t = 0.02)]
    churn: f64,

    /// RNG seed; identical seeds reproduce identical runs.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_drop_policy(name: &str) -> Option<DropPolicyKind> {
    match name {
        "fifo" => Some(DropPolicyKind::Fifo),
        "mofo" => Some(DropPolicyKind::Mofo),
        "shli" => Some(DropPolicyKind::Shli),
        "passive" => Some(DropPolicyKind::Passive),
        _ => None,
    }
}

fn parse_router(name: &str) -> Option<RouterKind> {
    match name {
        "epidemic" => Some(RouterKind::Epidemic),
        "predictability" => Some(RouterKind::Predictability),
        "cost" => Some(RouterKind::CostBased),
        "disaster" => Some(RouterKind::Disaster),
        _ => None,
    }
}

/// Generate `count` unicast creations at random times, in time order.
fn generate_traffic(args: &Args, rng: &mut StdRng) -> Vec<ExternalEvent> {
    let mut times: Vec<f64> =
        (0..args.messages).map(|_| rng.random_range(0.0..args.duration * 0.8)).collect();
    times.sort_by(f64::total_cmp);

    times
        .into_iter()
        .enumerate()
        .map(|(index, time)| {
            let from = rng.random_range(0..args.hosts as u32);
            let mut to = rng.random_range(0..args.hosts as u32);
            while to == from {
                to = rng.random_range(0..args.hosts as u32);
            }
            ExternalEvent::CreateMessage(MessageEvent {
                time,
                id: format!("M{index}"),
                from: HostId(from),
                recipients: Recipients::Unicast(HostId(to)),
                size: args.message_size,
                response_size: 0,
                priority: None,
                ttl: None,
            })
        })
        .collect()
}

fn run(args: &Args) -> Result<SimStats, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);

    let drop_policy = parse_drop_policy(&args.drop_policy)
        .ok_or_else(|| format!("unknown drop policy {:?}", args.drop_policy))?;
    let router_kind = parse_router(&args.router)
        .ok_or_else(|| format!("unknown router {:?}", args.router))?;

    let mut config = ScenarioConfig {
        hosts: args.hosts,
        buffer_capacity: args.buffer,
        link_speed: args.speed,
        tick_interval: args.tick,
        default_ttl: args.ttl,
        drop_policy,
        events: generate_traffic(args, &mut rng),
        ..ScenarioConfig::default()
    };
    config.router.kind = router_kind;

    let mut world = World::new(&config)?;
    let stats = Rc::new(RefCell::new(SimStats::new()));
    world.register_listener(Box::new(Rc::clone(&stats)));

    let mut in_range = vec![vec![false; args.hosts]; args.hosts];
    info!(hosts = args.hosts, duration = args.duration, "starting run");

    while world.now() < args.duration {
        for a in 0..args.hosts {
            for b in (a + 1)..args.hosts {
                if rng.random_bool(args.churn) {
                    in_range[a][b] = !in_range[a][b];
                    world.set_connectivity(HostId(a as u32), HostId(b as u32), in_range[a][b]);
                }
            }
        }
        world.step();
    }

    let result = stats.borrow().clone();
    Ok(result)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(stats) => {
            match serde_json::to_string_pretty(&stats) {
                Ok(json) => println!("{json}"),
                Err(err) => {
                    eprintln!("failed to serialize stats: {err}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("simulation failed: {err}");
            ExitCode::FAILURE
        }
    }
}
