//! Settings file: endpoints, credentials and agents for the CLI.
//!
//! Read from `chainagent.config.json` in the working directory. A missing
//! file yields defaults, so `init` can run before one exists; required
//! values are checked when they are first asked for.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::config::RunnerConfig;
use crate::error::RunnerError;

pub const CONFIG_FILENAME: &str = "chainagent.config.json";
pub const KEYSTORE_DIRNAME: &str = ".chainagent";

pub const DEFAULT_REGISTRY_CONTRACT: &str = "0xBD7F842Cb96dFF147d6b9b4c9f8e56acF76A969B";
pub const DEFAULT_REGISTRY_RPC_URL: &str = "https://goerli-light.eth.linkpool.io/";
pub const DEFAULT_IMAGE_REPOSITORY: &str = "disco.forta.network";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub json_rpc_url: Option<String>,
    pub ipfs_gateway_url: Option<String>,
    pub ipfs_gateway_auth_header: Option<String>,
    pub agent_registry_contract_address: Option<String>,
    pub agent_registry_json_rpc_url: Option<String>,
    pub image_repository_url: Option<String>,
    pub debug: bool,
    pub agents: Vec<Agent>,
    pub runner: RunnerConfig,
}

impl Settings {
    /// Load settings from `path`; defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            RunnerError::InvalidConfiguration(format!("{}: {e}", path.display()))
        })
    }

    /// Chain JSON-RPC endpoint (required for every run mode except `file`).
    pub fn json_rpc_url(&self) -> Result<&str, RunnerError> {
        required(&self.json_rpc_url, "jsonRpcUrl")
    }

    /// Content-addressed storage gateway (required for `publish`).
    pub fn ipfs_gateway_url(&self) -> Result<&str, RunnerError> {
        required(&self.ipfs_gateway_url, "ipfsGatewayUrl")
    }

    /// Gateway authorization header. Infura gateways refuse anonymous uploads.
    pub fn ipfs_gateway_auth_header(&self) -> Result<Option<&str>, RunnerError> {
        let gateway = self.ipfs_gateway_url()?;
        let header = self.ipfs_gateway_auth_header.as_deref().filter(|h| !h.is_empty());
        if gateway.contains("ipfs.infura.io") && header.is_none() {
            return Err(RunnerError::missing("ipfsGatewayAuthHeader"));
        }
        Ok(header)
    }

    pub fn agent_registry_contract_address(&self) -> &str {
        self.agent_registry_contract_address
            .as_deref()
            .unwrap_or(DEFAULT_REGISTRY_CONTRACT)
    }

    pub fn agent_registry_json_rpc_url(&self) -> &str {
        self.agent_registry_json_rpc_url
            .as_deref()
            .unwrap_or(DEFAULT_REGISTRY_RPC_URL)
    }

    pub fn image_repository_url(&self) -> &str {
        self.image_repository_url
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_REPOSITORY)
    }

    /// A template written by `init`.
    pub fn template() -> Self {
        Self {
            json_rpc_url: Some("https://cloudflare-eth.com/".into()),
            ipfs_gateway_url: Some("https://ipfs.infura.io:5001".into()),
            ipfs_gateway_auth_header: Some(String::new()),
            ..Self::default()
        }
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, RunnerError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RunnerError::missing(field))
}

/// `~/.chainagent`, or `./.chainagent` when no home directory is known.
pub fn keystore_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(KEYSTORE_DIRNAME)
}
