//! `chainagent publish`
//!
//! Optionally builds and pushes the agent image, uploads the agent manifest
//! to the content-addressed storage gateway, signs the manifest digest with
//! the keyfile and prints what the registry entry needs. Submitting the
//! registry transaction itself is left to the operator's wallet tooling.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tiny_keccak::{Hasher, Keccak};
use tokio::process::Command;

use chainagent_core::Settings;

use crate::keyfile::Signer;

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
}

/// What `publish` reports.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub agent_id: String,
    pub manifest_digest: String,
    pub manifest_reference: String,
    pub registry_contract: String,
    pub image_repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<String>,
    /// Address of the keyfile that signed `manifest_digest`.
    pub publisher: String,
    pub signature: String,
}

/// Optional image build for `publish`.
#[derive(Debug, Clone)]
pub struct ImageBuild<'a> {
    /// Docker build context.
    pub context: &'a Path,
    /// Container CLI, `docker` unless overridden.
    pub program: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut out);
    out
}

pub fn keccak256_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(bytes)))
}

/// Agent ids are the keccak-256 of the agent name.
pub fn agent_id(name: &str) -> String {
    keccak256_hex(name.as_bytes())
}

pub async fn run(
    settings: &Settings,
    manifest_path: &Path,
    signer: &dyn Signer,
    image: Option<ImageBuild<'_>>,
) -> Result<()> {
    let gateway = settings.ipfs_gateway_url()?;
    let auth = settings.ipfs_gateway_auth_header()?;

    let mut bytes = std::fs::read(manifest_path)
        .with_context(|| format!("cannot read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid manifest {}", manifest_path.display()))?;
    if manifest.name.trim().is_empty() {
        bail!("manifest name must not be empty");
    }

    let repository = settings.image_repository_url();
    let image_reference = match image {
        Some(build) => {
            let tag = image_tag(repository, &manifest.name, &keccak256_hex(&bytes));
            build_and_push(build, &tag).await?;
            bytes = with_image_reference(&bytes, &tag)?;
            Some(tag)
        }
        None => None,
    };

    let digest = keccak256(&bytes);
    let signature = signer.sign_digest(&digest)?;
    let reference = upload(gateway, auth, bytes).await?;
    let publication = Publication {
        agent_id: agent_id(&manifest.name),
        manifest_digest: format!("0x{}", hex::encode(digest)),
        manifest_reference: reference,
        registry_contract: settings.agent_registry_contract_address().to_string(),
        image_repository: repository.to_string(),
        image_reference,
        publisher: signer.address().to_string(),
        signature,
    };
    tracing::info!(
        agent = %manifest.name,
        agent_id = %publication.agent_id,
        publisher = %publication.publisher,
        reference = %publication.manifest_reference,
        "manifest published"
    );
    println!("{}", serde_json::to_string_pretty(&publication)?);
    Ok(())
}

/// `<repository>/<agent-name>:<first 12 hex digits of the manifest digest>`.
pub fn image_tag(repository: &str, name: &str, manifest_digest: &str) -> String {
    let slug: String = name
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' { c } else { '-' })
        .collect();
    let short = manifest_digest.trim_start_matches("0x");
    let short = &short[..short.len().min(12)];
    format!("{}/{slug}:{short}", repository.trim_end_matches('/'))
}

/// Add `imageReference` to the manifest object.
fn with_image_reference(manifest: &[u8], tag: &str) -> Result<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(manifest)?;
    let Some(object) = value.as_object_mut() else {
        bail!("manifest must be a JSON object");
    };
    object.insert("imageReference".into(), Value::String(tag.into()));
    Ok(serde_json::to_vec_pretty(&value)?)
}

async fn build_and_push(build: ImageBuild<'_>, tag: &str) -> Result<()> {
    let context = build.context.to_string_lossy();
    container_cli(build.program, &["build", "--tag", tag, context.as_ref()]).await?;
    container_cli(build.program, &["push", tag]).await?;
    tracing::info!(image = %tag, "agent image pushed");
    Ok(())
}

async fn container_cli(program: &str, args: &[&str]) -> Result<()> {
    tracing::debug!(program, ?args, "running");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("cannot run {program}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{program} {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status.code().unwrap_or(-1),
            stderr.trim()
        );
    }
    Ok(())
}

async fn upload(gateway: &str, auth: Option<&str>, bytes: Vec<u8>) -> Result<String> {
    let url = format!("{}/api/v0/add", gateway.trim_end_matches('/'));
    let part = reqwest::multipart::Part::bytes(bytes).file_name("manifest.json");
    let form = reqwest::multipart::Form::new().part("file", part);

    let mut request = reqwest::Client::new().post(&url).multipart(form);
    if let Some(auth) = auth {
        request = request.header(reqwest::header::AUTHORIZATION, auth);
    }
    let resp = request
        .send()
        .await
        .with_context(|| format!("upload to {url} failed"))?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        bail!("gateway returned HTTP {status}: {body}");
    }
    let added: AddResponse = resp.json().await.context("unexpected gateway response")?;
    Ok(added.hash)
}
