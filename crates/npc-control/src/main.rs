//! NPC Task Control demo runner
//!
//! Loads a task catalog, spawns a small world of workers, rocks and trees,
//! marks the resources for passive work and lets routines run for a number
//! of ticks, logging every message the controller sends.

use bevy_ecs::prelude::*;
use clap::Parser;
use npc_control::components::Tags;
use npc_control::config::ControllerConfig;
use npc_control::net::to_net;
use npc_control::setup::{self, SimRng, SpawnConfig};
use npc_control::systems::{build_schedule, Inbox, Outbox};
use npc_control::{ComponentRegistry, LogExecutor, TaskCatalog};
use npc_messages::{ClientMessage, ControllerId, PassiveTaskRequest, TaskId};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Command line arguments for the demo
#[derive(Parser, Debug)]
#[command(name = "npc_control")]
#[command(about = "Runs the NPC task controller against a generated world")]
struct Args {
    /// Task catalog (TOML or JSON)
    #[arg(long, default_value = "crates/npc-control/data/tasks.toml")]
    catalog: PathBuf,

    /// Controller configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 100)]
    ticks: u64,

    /// Seconds of simulation time per tick
    #[arg(long, default_value_t = 0.25)]
    dt: f64,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of workers to spawn
    #[arg(long, default_value_t = 4)]
    actors: usize,
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Marks every tagged resource for its passive task on behalf of `owner`.
fn passive_requests(world: &mut World, owner: ControllerId) -> Vec<ClientMessage> {
    let mut rocks = Vec::new();
    let mut trees = Vec::new();
    for (entity, tags) in world.query::<(Entity, &Tags)>().iter(world) {
        if tags.contains("Rock") {
            rocks.push(to_net(entity));
        } else if tags.contains("Tree") {
            trees.push(to_net(entity));
        }
    }
    [("Mine", rocks), ("Chop", trees)]
        .into_iter()
        .map(|(task, targets)| {
            ClientMessage::PassiveTaskRequest(PassiveTaskRequest {
                requester: owner,
                task_id: TaskId::new(task),
                targets,
            })
        })
        .collect()
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    if args.print_default_config {
        println!("{}", npc_control::config::default_config_toml());
        return ExitCode::SUCCESS;
    }

    let config = match &args.config {
        Some(path) => match ControllerConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "Could not load config");
                return ExitCode::FAILURE;
            }
        },
        None => ControllerConfig::default(),
    };

    let registry = ComponentRegistry::with_builtin();
    let catalog = match TaskCatalog::from_file(&args.catalog, &registry) {
        Ok(catalog) => catalog,
        Err(err) => {
            tracing::error!(path = %args.catalog.display(), %err, "Could not load task catalog");
            return ExitCode::FAILURE;
        }
    };

    let dt = match Duration::try_from_secs_f64(args.dt) {
        Ok(dt) if !dt.is_zero() => dt,
        _ => {
            tracing::error!(dt = args.dt, "Tick length must be positive");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(seed = args.seed, ticks = args.ticks, ?dt, tasks = catalog.len(), "Starting");

    let mut world = World::new();
    setup::insert_resources(&mut world, catalog, config, registry, Box::new(LogExecutor), dt);

    let spawn = SpawnConfig {
        actors: args.actors,
        ..Default::default()
    };
    let mut rng = SimRng(SmallRng::seed_from_u64(args.seed));
    setup::spawn_world(&mut world, &spawn, &mut rng.0);
    world.insert_resource(rng);
    tracing::info!(summary = %setup::spawn_summary(&mut world), "World ready");

    let mut schedule = build_schedule();
    // Actors must be registered before they can be ordered
    schedule.run(&mut world);
    let requests = passive_requests(&mut world, spawn.owner);
    world.resource_mut::<Inbox>().0.extend(requests);

    let mut sent = 0usize;
    for tick in 0..args.ticks {
        schedule.run(&mut world);
        for message in world.resource_mut::<Outbox>().drain() {
            sent += 1;
            match serde_json::to_string(&message) {
                Ok(json) => tracing::info!(tick, recipient = %message.recipient(), %json, "Outgoing"),
                Err(err) => tracing::warn!(tick, %err, "Could not encode message"),
            }
        }
    }

    tracing::info!(ticks = args.ticks, messages = sent, "Simulation complete");
    ExitCode::SUCCESS
}
