use crate::app::config::EngineConfig;
use crate::app::scenario::{Scenario, ScenarioReport, Step, build_engine, run_scenario};
use crate::domain::catalog::DefinitionCatalog;
use crate::domain::discovery::AutoConnect;
use crate::domain::types::DataType;
use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub auto_connect: Option<AutoConnect>,
    pub events: bool,
}

/// Resolve the engine config: scenario file, then `--config`, then flags.
fn resolve_config(scenario: &Scenario, opts: &RunOptions) -> Result<EngineConfig> {
    let mut config = match &opts.config {
        Some(path) => EngineConfig::load(path)?,
        None => scenario.config.unwrap_or_default(),
    };
    if let Some(mode) = opts.auto_connect {
        config.discovery.auto_connect = mode;
    }
    Ok(config)
}

pub fn run_scenario_file(path: &Path, opts: &RunOptions) -> Result<ScenarioReport> {
    let scenario = Scenario::load(path)?;
    let config = resolve_config(&scenario, opts)?;
    info!(
        steps = scenario.steps.len(),
        definitions = scenario.definitions.len(),
        "replaying scenario"
    );
    let engine = build_engine(&scenario, Some(config));
    Ok(run_scenario(&scenario, &engine))
}

/// Replay a scenario and print the resulting graph as JSON.
pub fn run(path: &Path, opts: &RunOptions) -> Result<()> {
    let report = run_scenario_file(path, opts)?;
    let mut output = serde_json::json!({
        "steps": report.steps,
        "graph": report.graph,
    });
    if opts.events {
        output["events"] = serde_json::to_value(&report.events)?;
    }
    println!("{}", serde_json::to_string_pretty(&output)?);

    let failed = report.failed_steps();
    if failed > 0 {
        bail!("{} of {} scenario step(s) failed", failed, report.steps.len());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct DataTypeSummary {
    pub data_type: String,
    pub providers: Vec<String>,
    pub consumers: Vec<String>,
    pub connectable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub steps: usize,
    pub data_types: Vec<DataTypeSummary>,
    pub warnings: Vec<String>,
}

pub fn check_scenario(path: &Path) -> Result<CheckReport> {
    let scenario = Scenario::load(path)?;

    let mut catalog: DefinitionCatalog<Value> = DefinitionCatalog::new();
    for spec in &scenario.definitions {
        catalog.register(spec.clone().into_definition());
    }
    for step in &scenario.steps {
        if let Step::RegisterDefinition(spec) = step {
            catalog.register(spec.clone().into_definition());
        }
    }

    let data_types = catalog
        .data_types()
        .into_iter()
        .map(|data_type| {
            let compatible = catalog.find_compatible(&data_type);
            DataTypeSummary {
                data_type: data_type.to_string(),
                providers: compatible.providers.iter().map(|d| d.owner.to_string()).collect(),
                consumers: compatible.consumers.iter().map(|d| d.owner.to_string()).collect(),
                connectable: compatible.is_connectable(),
            }
        })
        .collect();

    let mut warnings = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        let data_type = match step {
            Step::Push { data_type, .. }
            | Step::Request { data_type, .. }
            | Step::Connect { data_type, .. } => data_type,
            _ => continue,
        };
        if !catalog
            .find_compatible(&DataType::from(data_type.as_str()))
            .is_connectable()
        {
            warnings.push(format!(
                "step {index}: data type '{data_type}' has no provider/consumer definition pair"
            ));
        }
    }

    Ok(CheckReport {
        steps: scenario.steps.len(),
        data_types,
        warnings,
    })
}

pub fn check(path: &Path) -> Result<()> {
    let report = check_scenario(path)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
