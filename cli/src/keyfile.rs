//! Encrypted keyfile in the keystore directory, and the signing capability
//! `publish` uses.
//!
//! The keyfile is a standard Ethereum V3 keystore (scrypt + AES-128-CTR),
//! named `UTC--<timestamp>--<address>` like the files other wallets write.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::commands::publish::keccak256;

const KEYFILE_PREFIX: &str = "UTC--";

/// Signs 32-byte digests on behalf of one address.
pub trait Signer: Send + Sync {
    /// `0x`-prefixed, lowercase.
    fn address(&self) -> &str;

    /// 65-byte `r ‖ s ‖ v` signature (v = 27/28), hex encoded with `0x`.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String>;
}

/// A secp256k1 key decrypted from the keyfile. The key bytes are zeroed on drop.
pub struct KeyfileSigner {
    key: SigningKey,
    address: String,
}

impl KeyfileSigner {
    fn from_secret(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).context("keyfile does not hold a secp256k1 key")?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }
}

impl Signer for KeyfileSigner {
    fn address(&self) -> &str {
        &self.address
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let (signature, recovery) = self
            .key
            .sign_prehash_recoverable(digest)
            .context("signing failed")?;
        let mut out = signature.to_bytes().to_vec();
        out.push(27 + recovery.to_byte());
        Ok(format!("0x{}", hex::encode(out)))
    }
}

/// Ethereum address: last 20 bytes of the keccak of the uncompressed public key.
fn address_of(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// The keyfile in `dir`, if there is one.
pub fn find_keyfile(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", dir.display())),
    };
    let mut found = vec![];
    for entry in entries {
        let path = entry?.path();
        let is_keyfile = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(KEYFILE_PREFIX));
        if is_keyfile && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.pop())
}

/// Generate a key, encrypt it with `passphrase` into `dir` and return its path.
pub fn create_keyfile(dir: &Path, passphrase: &str) -> Result<(PathBuf, KeyfileSigner)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create keystore directory {}", dir.display()))?;

    let mut rng = rand::thread_rng();
    let mut secret = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut secret[..]);
    let signer = KeyfileSigner::from_secret(&secret[..])?;

    let name = format!(
        "{KEYFILE_PREFIX}{}--{}",
        chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ"),
        signer.address.trim_start_matches("0x")
    );
    eth_keystore::encrypt_key(dir, &mut rng, &secret[..], passphrase, Some(&name))
        .map_err(|e| anyhow::anyhow!("cannot write keyfile: {e}"))?;
    tracing::info!(address = %signer.address, dir = %dir.display(), "keyfile created");
    Ok((dir.join(name), signer))
}

/// Decrypt the keyfile in `dir` with `passphrase`.
pub fn get_keyfile(dir: &Path, passphrase: &str) -> Result<KeyfileSigner> {
    let Some(path) = find_keyfile(dir)? else {
        bail!("no keyfile in {}; run `chainagent init` first", dir.display());
    };
    let secret = Zeroizing::new(
        eth_keystore::decrypt_key(&path, passphrase)
            .map_err(|e| anyhow::anyhow!("cannot decrypt {}: {e}", path.display()))?,
    );
    KeyfileSigner::from_secret(&secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    #[test]
    fn create_then_get_yields_same_address() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_keyfile(dir.path()).unwrap().is_none());

        let (path, created) = create_keyfile(dir.path(), "hunter2").unwrap();
        assert!(path.is_file());
        assert_eq!(find_keyfile(dir.path()).unwrap(), Some(path));
        assert_eq!(created.address().len(), 42);

        let loaded = get_keyfile(dir.path(), "hunter2").unwrap();
        assert_eq!(loaded.address(), created.address());
        assert!(get_keyfile(dir.path(), "wrong").is_err());
    }

    #[test]
    fn signature_recovers_to_signer_address() {
        // Well-known test key 0x…01 has address 0x7e5f…bdf.
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let signer = KeyfileSigner::from_secret(&secret).unwrap();
        assert_eq!(signer.address(), "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf");

        let digest = keccak256(b"manifest");
        let sig = hex::decode(signer.sign_digest(&digest).unwrap().trim_start_matches("0x")).unwrap();
        assert_eq!(sig.len(), 65);
        let recovery = RecoveryId::from_byte(sig[64] - 27).unwrap();
        let signature = Signature::from_slice(&sig[..64]).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&digest, &signature, recovery).unwrap();
        assert_eq!(&recovered, signer.key.verifying_key());
    }

    #[test]
    fn missing_keyfile_points_at_init() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_keyfile(dir.path(), "x").err().unwrap();
        assert!(err.to_string().contains("chainagent init"));
    }
}
