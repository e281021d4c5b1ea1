//! The `creel upload` command.

use anyhow::{Context, Result};
use creel_client::{
    HttpBlobTransport, HttpChannel, HttpReceiptEndpoint, PollConfig, ReceiptClient,
    UploadOrchestrator,
};
use creel_ucan::Did;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::config::AppConfig;
use crate::identity;
use crate::progress::ConsoleProgress;

/// Upload a file (or stdin) into a space and wait for the network to
/// commit a retrievable location.
pub async fn run(config: &AppConfig, space: &str, file: Option<&Path>) -> Result<()> {
    let space = Did::parse(space).context("parsing space DID")?;
    let id = identity::load_or_generate(&config.key_file)?;
    let store = super::open_store(config).await?;

    let data = match file {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut data = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut data)
                .await
                .context("reading stdin")?;
            data
        }
    };

    let orchestrator = UploadOrchestrator::new(
        id,
        config.upload.clone(),
        store,
        HttpChannel::new(config.upload.url.clone()),
        HttpBlobTransport::new(),
        ReceiptClient::new(
            HttpReceiptEndpoint::new(config.upload.url.clone()),
            PollConfig::default(),
        ),
        ConsoleProgress,
    );

    let outcome = orchestrator.upload(&space, &data).await?;

    println!(
        "upload complete! Blob {} accepted in space {}",
        outcome.digest, space
    );
    println!("{}", outcome.content);

    Ok(())
}
