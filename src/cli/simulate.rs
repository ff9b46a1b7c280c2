//! `tessera simulate`

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tessera_core::{
    format_error_for_cli, Capability, ConversationContext, Intent, OrchestratorEvent,
    RunResponse, RunSubscription,
};
use tracing::info;

use super::plan::plan_for;
use super::read_json;
use crate::runtime::simulated::FaultPlan;
use crate::runtime::{AppConfig, Runtime};

pub async fn run(
    config: &AppConfig,
    intent_path: &Path,
    fail: &[String],
    reject: Vec<String>,
    json: bool,
) -> Result<()> {
    let intent: Intent = read_json(intent_path)?;
    let faults = FaultPlan {
        capabilities: parse_capabilities(fail)?,
        resources: reject.into_iter().collect(),
    };

    let runtime = Runtime::simulated(config, &faults).await?;
    let plan = plan_for(&intent)?;
    let conversation = ConversationContext::new(config.simulation.conversation_id.clone())
        .with_user("cli");

    let progress = runtime
        .orchestrator
        .event_bus()
        .map(|bus| bus.follow_plan(plan.id()));
    let (run, ()) = tokio::join!(
        runtime.orchestrator.execute(&plan, &conversation),
        report_progress(progress)
    );
    let response = RunResponse::from_run(&run);
    let pending = runtime.approvals.pending_for_run(run.id).await;
    runtime.shutdown();
    info!(run_id = %run.id, state = %run.state, pending_confirmations = pending.len(), "Simulation finished");

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", response.text);
        for request in &pending {
            println!(
                "Awaiting confirmation: {} ({}, {} risk, request {})",
                request.candidate.id, request.candidate.resource_id, request.assessment.tier, request.id
            );
        }
    }

    match run.error() {
        Some(e) => Err(anyhow!(format_error_for_cli(&e))),
        None => Ok(()),
    }
}

/// Log step progress of the simulated run as it happens
async fn report_progress(subscription: Option<RunSubscription>) {
    let Some(mut subscription) = subscription else {
        return;
    };
    while let Some(event) = subscription.recv().await {
        match event {
            OrchestratorEvent::StepCompleted {
                step_id,
                status,
                duration_ms,
                ..
            } => info!(step_id = %step_id, status = %status, duration_ms, "Step completed"),
            OrchestratorEvent::StepSkipped { step_id, .. } => {
                info!(step_id = %step_id, "Step skipped")
            }
            OrchestratorEvent::RollbackStarted { snapshots, .. } => {
                info!(snapshots, "Rolling back")
            }
            _ => {}
        }
    }
}

fn parse_capabilities(names: &[String]) -> Result<BTreeSet<Capability>> {
    names
        .iter()
        .map(|name| {
            name.parse::<Capability>()
                .map_err(|_| anyhow!("unknown capability '{}'", name))
        })
        .collect()
}
