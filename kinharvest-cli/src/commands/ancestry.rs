//! AncestryDNA harvest command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kinharvest_fetch::{AuthSession, ReqwestTransport};
use kinharvest_providers::ancestry::{endpoints, AncestryHarvest, AncestryHarvester};
use tracing::info;

use crate::output::write_tsv;

use super::VendorArgs;

/// Runs the AncestryDNA harvest.
pub async fn run(args: &VendorArgs) -> Result<()> {
    let credentials = args.credentials()?;
    let timeout = Duration::from_secs(args.timeout);

    let transport = Arc::new(ReqwestTransport::with_timeout(timeout)?);
    let session =
        AuthSession::connect(transport, credentials, endpoints::session_config(timeout)).await?;
    info!("Logged in to AncestryDNA");

    let harvester = AncestryHarvester::new(&session);
    let harvest = harvester.harvest(args.extended).await?;

    let prefix = args
        .out
        .clone()
        .or_else(|| harvest.default_prefix.clone())
        .unwrap_or_else(|| "out".to_string());
    write_harvest(&prefix, &harvest)
}

fn write_harvest(prefix: &str, harvest: &AncestryHarvest) -> Result<()> {
    write_tsv(format!("{}.tsv", prefix), &harvest.tests)?;

    for test in &harvest.per_test {
        write_tsv(format!("{}.{}.tsv", prefix, test.guid), &test.matches)?;
    }

    Ok(())
}
