//! The `creel space` commands.

use anyhow::{Context, Result, bail};
use base58::ToBase58;
use creel_ucan::{Command, Delegation, Did, Ed25519Signer, Subject, signer::Principal};
use futures_util::{TryStreamExt, pin_mut};
use ipld_core::ipld::Ipld;

use crate::config::AppConfig;
use crate::identity;

/// Create a new space: a fresh keypair whose top authority is delegated
/// to the client identity, forever.
pub async fn create(config: &AppConfig, name: Option<&str>) -> Result<()> {
    let id = identity::load_or_generate(&config.key_file)?;
    let space = Ed25519Signer::generate().context("generating space key")?;

    let mut builder = Delegation::builder()
        .issuer(space.clone())
        .audience(id.did().clone())
        .subject(Subject::Specific(space.did().clone()))
        .command(Command::top());
    if let Some(name) = name {
        builder = builder.meta([("name".to_string(), Ipld::String(name.to_string()))].into());
    }
    let delegation = builder.try_build().context("issuing space delegation")?;

    let mut store = super::open_store(config).await?;
    store
        .put(&delegation)
        .await
        .context("storing space delegation")?;

    println!("Space ID:");
    println!("{}", space.did());
    println!();
    println!("Recovery key:");
    println!("{}", space.export().to_base58());

    Ok(())
}

/// List known spaces: the subjects of delegations granted to the client
/// identity.
pub async fn list(config: &AppConfig) -> Result<()> {
    let id = identity::load_or_generate(&config.key_file)?;
    let store = super::open_store(config).await?;

    let delegations = store.list(id.did());
    pin_mut!(delegations);
    while let Some((_, delegation)) = delegations.try_next().await? {
        let subject = match delegation.subject() {
            Subject::Specific(did) => did.to_string(),
            Subject::Any => continue,
        };
        match delegation.meta().get("name") {
            Some(Ipld::String(name)) => println!("{subject} {name}"),
            _ => println!("{subject}"),
        }
    }

    Ok(())
}

/// Remove every delegation scoped to the given space.
pub async fn remove(config: &AppConfig, space: &str) -> Result<()> {
    let space = Did::parse(space).context("parsing space DID")?;
    let id = identity::load_or_generate(&config.key_file)?;
    let mut store = super::open_store(config).await?;

    let matching: Vec<_> = {
        let delegations = store.list(id.did());
        pin_mut!(delegations);
        delegations
            .try_filter(|(_, delegation)| {
                futures_util::future::ready(
                    delegation.subject().as_specific() == Some(&space),
                )
            })
            .try_collect()
            .await?
    };

    for (link, _) in &matching {
        store.del(link).await?;
    }

    match matching.len() {
        0 => bail!("no delegation found for space: {space}"),
        1 => println!("Removed 1 delegation"),
        n => println!("Removed {n} delegations"),
    }

    Ok(())
}
