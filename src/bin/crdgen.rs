//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML from Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # All three CRDs as one multi-document stream
//! cargo run --bin crdgen > config/crd/alerts.yaml
//!
//! # A single kind
//! cargo run --bin crdgen -- --kind policy | kubectl apply -f -
//! ```

use alerts_policy_controller::crd::{AlertsApmCondition, AlertsNrqlCondition, AlertsPolicy};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    All,
    Policy,
    Nrql,
    Apm,
}

#[derive(Debug, Parser)]
#[command(name = "crdgen", about = "Print the CustomResourceDefinitions of the controller")]
struct Args {
    /// Which CRD to print
    #[arg(long, value_enum, default_value_t = Kind::All)]
    kind: Kind,
}

fn crds(kind: Kind) -> Vec<CustomResourceDefinition> {
    match kind {
        Kind::All => vec![
            AlertsPolicy::crd(),
            AlertsNrqlCondition::crd(),
            AlertsApmCondition::crd(),
        ],
        Kind::Policy => vec![AlertsPolicy::crd()],
        Kind::Nrql => vec![AlertsNrqlCondition::crd()],
        Kind::Apm => vec![AlertsApmCondition::crd()],
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let documents = crds(args.kind)
        .iter()
        .map(|crd| serde_yaml::to_string(crd).context("Failed to serialize CRD to YAML"))
        .collect::<Result<Vec<_>>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
