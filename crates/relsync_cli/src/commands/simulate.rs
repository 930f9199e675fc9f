//! Simulate command implementation.
//!
//! Stores one relationship through the service, hands the mutation to a
//! coordinator talking to scripted partners, and reports what happened.

use clap::Args;
use relsync_core::{
    CoreError, InMemoryRelationStore, PartnerId, RelationService, RelationStore, Relationship,
    StaticPartnerDirectory,
};
use relsync_engine::{
    EngineStats, JobState, MockPublisher, MockResolver, PublishKind, SyncCoordinator,
    SyncEngineConfig,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Arguments of the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Material id
    pub material: String,

    /// Partner id (random if omitted)
    #[arg(long)]
    pub partner: Option<Uuid>,

    /// The partner supplies the material
    #[arg(long)]
    pub supplier: bool,

    /// The partner buys the material
    #[arg(long)]
    pub customer: bool,

    /// Mark the material as a product of ours
    #[arg(long)]
    pub product: bool,

    /// Partner identifier known up front
    #[arg(long)]
    pub identifier: Option<String>,

    /// The partner's own material number
    #[arg(long)]
    pub partner_material_number: Option<String>,

    /// Identifier the scripted partner answers with
    #[arg(long, default_value = "urn:uuid:4f5a2c1e-7c8b-4a7e-9d3f-2b1c0a9e8d7f")]
    pub resolved_identifier: String,

    /// Resolver failures before the first answer
    #[arg(long, default_value = "0")]
    pub resolver_failures: usize,

    /// Registry failures before the first acceptance
    #[arg(long, default_value = "0")]
    pub publisher_failures: usize,

    /// JSON file with relationships preloaded into the store
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Latency of every resolver call in milliseconds
    #[arg(long, default_value = "0")]
    pub fetch_delay_ms: u64,

    /// Latency of every registry call in milliseconds
    #[arg(long, default_value = "0")]
    pub publish_delay_ms: u64,

    /// Our own BPNL
    #[arg(long, default_value = "BPNL000000000000")]
    pub own_bpnl: String,

    /// The partner's BPNL
    #[arg(long)]
    pub partner_bpnl: Option<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

/// Outcome of a simulation.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Publish job id.
    pub job_id: u64,
    /// Create or update.
    pub kind: PublishKind,
    /// Whether the job succeeded.
    pub succeeded: bool,
    /// Failure message of the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Publish attempts made.
    pub attempts: u32,
    /// States the job went through.
    pub transitions: Vec<JobState>,
    /// Identifier or failure message of the fetch, if one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<String>,
    /// The relationship as stored at the end.
    pub relationship: Relationship,
    /// Registry calls made.
    pub registry_calls: usize,
    /// Material number per BPNL.
    pub material_numbers: BTreeMap<String, String>,
    /// Engine counters.
    pub stats: EngineStats,
}

/// Runs the simulate command.
pub async fn run(args: &SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let report = simulate(args).await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Performs the simulation and returns its report.
pub async fn simulate(args: &SimulateArgs) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    let seed = match &args.seed {
        Some(path) => load_seed(path)?,
        None => Vec::new(),
    };
    let store = Arc::new(InMemoryRelationStore::with_records(seed));

    let resolver = MockResolver::answering(args.resolved_identifier.clone());
    resolver.fail_times(args.resolver_failures);
    resolver.set_latency(Duration::from_millis(args.fetch_delay_ms));

    let publisher = MockPublisher::new();
    publisher.fail_times(args.publisher_failures);
    publisher.set_latency(Duration::from_millis(args.publish_delay_ms));

    let relationship = build_relationship(args);
    let key = relationship.key();
    let directory = match &args.partner_bpnl {
        Some(bpnl) => StaticPartnerDirectory::new(&args.own_bpnl).with_partner(key.partner_id, bpnl),
        None => StaticPartnerDirectory::new(&args.own_bpnl),
    };
    let service = RelationService::new(Arc::clone(&store), Arc::new(directory));
    let coordinator = SyncCoordinator::new(
        SyncEngineConfig::default(),
        Arc::clone(&store),
        resolver,
        publisher,
    )?;

    let scheduled = match store.find(&key) {
        Ok(previous) => {
            let mut relationship = relationship;
            relationship.version = previous.version;
            if relationship.identifier().is_none() {
                relationship.partner_identifier = previous.partner_identifier.clone();
            }
            let stored = service.update(relationship)?;
            info!(key = %key, version = stored.version, "updated seeded relationship");
            coordinator.on_relationship_updated(&previous, &stored)
        }
        Err(CoreError::NotFound { .. }) => {
            let stored = service.create(relationship)?;
            info!(key = %key, "created relationship");
            coordinator.on_relationship_created(&stored)
        }
        Err(e) => return Err(e.into()),
    };

    let fetch = scheduled.fetch.clone();
    let job = scheduled.publish.await?;
    let fetch = match fetch {
        Some(handle) => Some(match handle.wait().await {
            Ok(identifier) => identifier,
            Err(e) => e.to_string(),
        }),
        None => None,
    };

    Ok(SimulationReport {
        job_id: job.job_id,
        kind: job.kind,
        succeeded: job.is_success(),
        error: job.outcome.as_ref().err().map(ToString::to_string),
        attempts: job.attempts,
        transitions: job.transitions.clone(),
        fetch,
        relationship: store.find(&key)?,
        registry_calls: coordinator.publisher().call_count(),
        material_numbers: service.partner_material_numbers(&key.material_id)?,
        stats: coordinator.stats(),
    })
}

fn build_relationship(args: &SimulateArgs) -> Relationship {
    let partner = args
        .partner
        .map(PartnerId::from_uuid)
        .unwrap_or_else(PartnerId::new_random);
    let mut rel = Relationship::new(&args.material, partner);
    if args.supplier {
        rel = rel.supplier();
    }
    if args.customer {
        rel = rel.customer();
    }
    if args.product {
        rel.material_flags.product = true;
    }
    if let Some(identifier) = &args.identifier {
        rel = rel.with_partner_identifier(identifier);
    }
    if let Some(number) = &args.partner_material_number {
        rel = rel.with_partner_material_number(number);
    }
    rel
}

fn load_seed(path: &Path) -> Result<Vec<Relationship>, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read seed file {:?}: {}", path, e))?;
    let records: Vec<Relationship> = serde_json::from_str(&contents)
        .map_err(|e| format!("invalid seed file {:?}: {}", path, e))?;
    Ok(records)
}

fn print_text_output(report: &SimulationReport) {
    println!("relsync Simulation");
    println!("==================");
    println!();
    println!("Relationship:");
    println!("  Material:    {}", report.relationship.material_id);
    println!("  Partner:     {}", report.relationship.partner_id);
    println!(
        "  Identifier:  {}",
        report.relationship.identifier().unwrap_or("-")
    );
    println!("  Version:     {}", report.relationship.version);
    println!();
    println!("Publish job #{} ({}):", report.job_id, report.kind);
    println!("  Attempts:    {}", report.attempts);
    let states: Vec<String> = report
        .transitions
        .iter()
        .map(|state| format!("{:?}", state))
        .collect();
    println!("  States:      {}", states.join(" -> "));
    match &report.error {
        Some(error) => println!("  Result:      failed ({})", error),
        None => println!("  Result:      succeeded"),
    }
    if let Some(fetch) = &report.fetch {
        println!("  Fetch:       {}", fetch);
    }
    println!("  Registry:    {} calls", report.registry_calls);

    if !report.material_numbers.is_empty() {
        println!();
        println!("Material numbers:");
        for (bpnl, number) in &report.material_numbers {
            println!("  {}  {}", bpnl, number);
        }
    }
}
