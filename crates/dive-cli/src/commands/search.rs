//! `dive search`: one federated fan-out from the command line.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use dive_config::DiveConfig;
use dive_federation::{FederatedQuery, FederationOrchestrator};
use dive_types::{Clearance, SubjectAttributes};
use tracing::info;

pub struct SearchArgs {
    pub classification: Option<String>,
    pub coi: Option<String>,
    pub limit: usize,
    pub country: String,
    pub clearance: String,
    pub instances: Vec<String>,
    pub deadline_ms: Option<u64>,
}

pub fn run(dir: &Path, args: &SearchArgs) -> Result<()> {
    let config = DiveConfig::load_from_dir(dir).context("Failed to load configuration")?;

    let mut query = FederatedQuery::default().with_limit(args.limit);
    if let Some(level) = &args.classification {
        let level: Clearance = level.parse().map_err(|e| anyhow!("{e}"))?;
        query = query.with_classification(level);
    }
    if let Some(coi) = &args.coi {
        query = query.with_coi(coi);
    }
    let subject = SubjectAttributes::new("cli", &args.clearance, &args.country)
        .with_origin(&config.instance.id);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = runtime.block_on(async {
        let orchestrator = FederationOrchestrator::from_config(&config)?;
        let targets = (!args.instances.is_empty()).then_some(args.instances.as_slice());
        let deadline = args.deadline_ms.map(Duration::from_millis);
        anyhow::Ok(
            orchestrator
                .query_federated_resources(&query, &subject, targets, deadline)
                .await,
        )
    })?;

    info!(
        total = result.total_resources,
        failed = result.query_stats.failed_queries.len(),
        "federated search finished"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
