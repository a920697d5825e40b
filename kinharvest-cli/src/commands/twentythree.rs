//! 23andMe harvest command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kinharvest_fetch::{AuthSession, ReqwestTransport};
use kinharvest_providers::twentythree::{endpoints, AccountHarvest, TwentyThreeHarvester};
use tracing::info;

use crate::output::{write_raw, write_tsv};

use super::VendorArgs;

/// Default output prefix when none is given.
const DEFAULT_PREFIX: &str = "out";

/// Runs the 23andMe harvest.
pub async fn run(args: &VendorArgs) -> Result<()> {
    let credentials = args.credentials()?;
    let timeout = Duration::from_secs(args.timeout);

    let transport = Arc::new(ReqwestTransport::with_timeout(timeout)?);
    let session =
        AuthSession::connect(transport, credentials, endpoints::session_config(timeout)).await?;
    info!("Logged in to 23andMe");

    let harvester = TwentyThreeHarvester::new(&session, args.parallelism);
    let harvest = harvester.harvest(args.extended).await?;

    let prefix = args.out.as_deref().unwrap_or(DEFAULT_PREFIX);
    write_harvest(prefix, &harvest)
}

fn write_harvest(prefix: &str, harvest: &AccountHarvest) -> Result<()> {
    write_tsv(format!("{}.tsv", prefix), &harvest.profiles)?;
    write_tsv(format!("{}.connections.tsv", prefix), &harvest.connections)?;

    for profile in &harvest.per_profile {
        write_tsv(
            format!("{}.{}.profiles.tsv", prefix, profile.profile),
            &profile.dna_profiles,
        )?;
        write_raw(
            format!("{}.{}.aggregate.csv", prefix, profile.profile),
            &profile.aggregate_csv,
        )?;
        if let Some(relatives) = &profile.relatives {
            write_tsv(
                format!("{}.{}.relatives.tsv", prefix, profile.profile),
                relatives,
            )?;
        }
    }

    if let Some(ibd) = &harvest.ibd {
        write_tsv(format!("{}.ibd.tsv", prefix), ibd)?;
    }

    Ok(())
}
