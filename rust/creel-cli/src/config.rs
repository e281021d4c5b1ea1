//! Configuration loading and resolution.
//!
//! Values are resolved flag-first: command line flags beat `CREEL_*`
//! environment variables, which beat the TOML config file, which beats
//! the selected network preset.

use anyhow::{Context, Result, bail};
use creel_client::ServiceConfig;
use creel_ucan::Did;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

use crate::Cli;
use crate::presets::{self, Network};

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory for client state.
    pub data_dir: PathBuf,

    /// Where the identity seed lives.
    pub key_file: PathBuf,

    /// The upload service.
    pub upload: ServiceConfig,

    /// The indexing service.
    #[allow(dead_code)]
    pub indexer: ServiceConfig,
}

impl AppConfig {
    /// Directory holding the delegation store.
    pub fn delegation_dir(&self) -> PathBuf {
        self.data_dir.join("delegation").join("datastore")
    }
}

/// The TOML shape of the config file. Every field is optional; absent
/// values fall through to presets.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    network: Option<String>,

    #[serde(default)]
    repo: RepoSection,

    #[serde(default)]
    identity: IdentitySection,

    #[serde(default)]
    services: ServicesSection,
}

#[derive(Debug, Default, Deserialize)]
struct RepoSection {
    #[serde(default)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentitySection {
    #[serde(default)]
    key_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicesSection {
    #[serde(default)]
    upload: ServiceSection,

    #[serde(default)]
    indexer: ServiceSection,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSection {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    url: Option<String>,
}

/// Resolve the effective configuration for this invocation.
pub fn resolve(cli: &Cli) -> Result<AppConfig> {
    let file = load_file(cli.config.as_deref())?;

    let network: Network = cli
        .network
        .clone()
        .or_else(|| env("CREEL_NETWORK"))
        .or(file.network.clone())
        .as_deref()
        .unwrap_or("dev")
        .parse()?;
    let preset = presets::preset(network);

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| env("CREEL_DATA_DIR").map(PathBuf::from))
        .or(file.repo.data_dir.clone())
        .or_else(|| dirs::home_dir().map(|home| home.join(".creel")))
        .context("no data directory available; pass --data-dir")?;

    let key_file = cli
        .key_file
        .clone()
        .or_else(|| env("CREEL_KEY_FILE").map(PathBuf::from))
        .or(file.identity.key_file.clone())
        .unwrap_or_else(|| data_dir.join("identity.key"));

    let upload_id = cli
        .upload_service_id
        .clone()
        .or_else(|| env("CREEL_UPLOAD_SERVICE_ID"))
        .or(file.services.upload.id.clone())
        .unwrap_or_else(|| preset.upload_service_id.to_string());
    let upload_url = cli
        .upload_service_url
        .clone()
        .or_else(|| env("CREEL_UPLOAD_SERVICE_URL"))
        .or(file.services.upload.url.clone())
        // The preset URL only applies to the preset's own service; an
        // overridden did:web ID derives its URL from its host instead.
        .or_else(|| {
            (upload_id == preset.upload_service_id).then(|| preset.upload_service_url.to_string())
        });
    let upload = service_config("upload", upload_id, upload_url)?;

    let indexer_id = cli
        .indexing_service_id
        .clone()
        .or_else(|| env("CREEL_INDEXING_SERVICE_ID"))
        .or(file.services.indexer.id.clone())
        .unwrap_or_else(|| preset.indexing_service_id.to_string());
    let indexer_url = cli
        .indexing_service_url
        .clone()
        .or_else(|| env("CREEL_INDEXING_SERVICE_URL"))
        .or(file.services.indexer.url.clone())
        .or_else(|| {
            (indexer_id == preset.indexing_service_id)
                .then(|| preset.indexing_service_url.to_string())
        });
    let indexer = service_config("indexing", indexer_id, indexer_url)?;

    Ok(AppConfig {
        data_dir,
        key_file,
        upload,
        indexer,
    })
}

fn service_config(name: &str, id: String, url: Option<String>) -> Result<ServiceConfig> {
    let id = Did::parse(&id).with_context(|| format!("parsing {name} service DID"))?;
    let url = match url {
        Some(url) => Url::parse(&url).with_context(|| format!("parsing {name} service URL"))?,
        None => match id.web_host() {
            Some(host) => Url::parse(&format!("https://{host}"))
                .with_context(|| format!("deriving {name} service URL from DID"))?,
            None => bail!("{name} service URL is required for non-web DIDs"),
        },
    };
    Ok(ServiceConfig { id, url })
}

fn load_file(explicit: Option<&Path>) -> Result<ConfigFile> {
    let path = match explicit {
        Some(path) => Some(path.to_owned()),
        None => dirs::config_dir()
            .map(|dir| dir.join("creel").join("config.toml"))
            .filter(|path| path.is_file()),
    };

    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };

    info!(path = %path.display(), "loading config");
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file: {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file: {}", path.display()))
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn a_web_did_derives_its_url_when_none_is_given() -> TestResult {
        let config = service_config("upload", "did:web:up.example.org".to_string(), None)?;
        assert_eq!(config.url.as_str(), "https://up.example.org/");
        Ok(())
    }

    #[test]
    fn a_key_did_requires_an_explicit_url() {
        use creel_ucan::signer::Principal;
        let id = creel_ucan::Ed25519Signer::from_seed(&[1; 32])
            .did()
            .to_string();
        assert!(service_config("upload", id, None).is_err());
    }

    #[test]
    fn config_files_parse_with_partial_sections() -> TestResult {
        let parsed: ConfigFile = toml::from_str(
            r#"
            network = "dev"

            [services.upload]
            id = "did:web:up.example.org"
            "#,
        )?;
        assert_eq!(parsed.network.as_deref(), Some("dev"));
        assert_eq!(
            parsed.services.upload.id.as_deref(),
            Some("did:web:up.example.org")
        );
        assert!(parsed.repo.data_dir.is_none());
        Ok(())
    }
}
