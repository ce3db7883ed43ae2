//! `chainagent init`

use std::path::Path;

use anyhow::{bail, Context, Result};

use chainagent_core::Settings;

use crate::keyfile::{create_keyfile, find_keyfile, Signer};

/// Create `keystore` with an encrypted keyfile, and write a settings
/// template to `config_path`. Existing files are left untouched.
pub fn run(keystore: &Path, config_path: &Path, passphrase: Option<&str>) -> Result<()> {
    std::fs::create_dir_all(keystore)
        .with_context(|| format!("cannot create keystore directory {}", keystore.display()))?;

    match find_keyfile(keystore)? {
        Some(path) => {
            tracing::info!(path = %path.display(), "keyfile already exists, leaving it untouched");
        }
        None => {
            let Some(passphrase) = passphrase.filter(|p| !p.is_empty()) else {
                bail!("a passphrase is needed to create the keyfile (--passphrase or CHAINAGENT_PASSPHRASE)");
            };
            let (path, signer) = create_keyfile(keystore, passphrase)?;
            println!("created keyfile {} for {}", path.display(), signer.address());
        }
    }

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "settings file already exists, leaving it untouched");
        return Ok(());
    }
    let template = serde_json::to_string_pretty(&Settings::template())?;
    std::fs::write(config_path, template + "\n")
        .with_context(|| format!("cannot write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(())
}
