//! Network presets.

use anyhow::bail;
use std::fmt;

/// Networks the client knows presets for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// The development network.
    Dev,
}

/// Every network the client knows presets for.
pub const AVAILABLE_NETWORKS: &[Network] = &[Network::Dev];

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Dev => f.write_str("dev"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Network::Dev),
            other => bail!(
                "unknown network: {other:?} (valid networks are: {AVAILABLE_NETWORKS:?})"
            ),
        }
    }
}

/// Service settings a network preset provides.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    /// DID of the upload service.
    pub upload_service_id: &'static str,

    /// URL of the upload service.
    pub upload_service_url: &'static str,

    /// DID of the indexing service.
    pub indexing_service_id: &'static str,

    /// URL of the indexing service.
    pub indexing_service_url: &'static str,
}

/// The preset configuration for a network.
pub fn preset(network: Network) -> Preset {
    match network {
        Network::Dev => Preset {
            upload_service_id: "did:web:up.dev.creel.storage",
            upload_service_url: "http://up.dev.creel.storage",
            indexing_service_id: "did:web:indexer.dev.creel.storage",
            indexing_service_url: "http://indexer.dev.creel.storage",
        },
    }
}
