//! Client identity management.
//!
//! The identity is an ed25519 keypair whose base58-encoded seed lives in
//! a key file. A missing key file is populated with a freshly generated
//! seed on first use.

use anyhow::{Context, Result, bail};
use base58::{FromBase58, ToBase58};
use creel_ucan::Ed25519Signer;
use std::path::Path;
use tracing::info;

/// Load the identity from `path`, generating and persisting a new one
/// when no key file exists yet.
pub fn load_or_generate(path: &Path) -> Result<Ed25519Signer> {
    if path.exists() {
        return load(path);
    }

    let signer = Ed25519Signer::generate().context("generating identity key")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating key directory: {}", parent.display()))?;
    }
    std::fs::write(path, signer.export().to_base58())
        .with_context(|| format!("writing key file: {}", path.display()))?;
    restrict_permissions(path)?;
    info!(path = %path.display(), "generated new identity");
    Ok(signer)
}

fn load(path: &Path) -> Result<Ed25519Signer> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading key file: {}", path.display()))?;
    let Ok(seed) = contents.trim().from_base58() else {
        bail!("malformed key file (expected base58 seed): {}", path.display());
    };
    Ed25519Signer::import(&seed).with_context(|| format!("importing key: {}", path.display()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting key file permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use creel_ucan::signer::Principal;
    use testresult::TestResult;

    #[test]
    fn a_generated_identity_loads_back_identically() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");

        let first = load_or_generate(&path)?;
        let second = load_or_generate(&path)?;
        assert_eq!(first.did(), second.did());
        Ok(())
    }

    #[test]
    fn garbage_key_files_are_rejected() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("identity.key");
        std::fs::write(&path, "not base58 0OIl")?;
        assert!(load_or_generate(&path).is_err());
        Ok(())
    }
}
