//! Key material, epoch salt and key derivation for the registry codec.

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use zeroize::Zeroizing;

use crate::errors::{CodecError, Result};

/// Memory cost (KiB) of the Argon2id derivation. Kept small: the round count
/// carries the tunable cost and every node decodes the whole registry.
const KDF_MEMORY_KIB: u32 = 4 * 1024;
const KDF_LANES: u32 = 1;
const SALT_DOMAIN: &[u8] = b"peerlink/registry/epoch";

/// Which half of the key pair a derived key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    Decode,
    Encode,
}

/// Pre-provisioned symmetric key pair.
///
/// The cipher is symmetric, so the decode half ("private key") only opens
/// entries sealed with identical encode material ("public key"). The halves
/// are provisioned separately but must match; a node whose halves differ
/// could never read back its own entries.
#[derive(Clone)]
pub struct CipherKeys {
    decode_key: Zeroizing<Vec<u8>>,
    encode_key: Zeroizing<Vec<u8>>,
}

impl CipherKeys {
    pub fn new(decode_key: impl Into<Vec<u8>>, encode_key: impl Into<Vec<u8>>) -> Result<Self> {
        let decode_key = Zeroizing::new(decode_key.into());
        let encode_key = Zeroizing::new(encode_key.into());
        if decode_key.is_empty() {
            return Err(CodecError::InvalidConfig(
                "private (decode) key must not be empty".into(),
            ));
        }
        if encode_key.is_empty() {
            return Err(CodecError::InvalidConfig(
                "public (encode) key must not be empty".into(),
            ));
        }
        if decode_key.as_slice() != encode_key.as_slice() {
            return Err(CodecError::InvalidConfig(
                "private (decode) and public (encode) keys must be the same shared secret".into(),
            ));
        }
        Ok(Self {
            decode_key,
            encode_key,
        })
    }

    pub(crate) fn material(&self, role: KeyRole) -> &[u8] {
        match role {
            KeyRole::Decode => &self.decode_key,
            KeyRole::Encode => &self.encode_key,
        }
    }
}

impl fmt::Debug for CipherKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKeys")
            .field("decode_key", &"<redacted>")
            .field("encode_key", &"<redacted>")
            .finish()
    }
}

/// Fixed, globally agreed, non-secret timestamp namespacing the token format.
///
/// Codecs built against a different epoch derive different keys, so their
/// tokens fail authentication instead of cross-decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSalt {
    secs: i64,
    nanos: u32,
}

impl EpochSalt {
    /// 2019-11-11T10:20:10.000000300Z
    pub const PROTOCOL: EpochSalt = EpochSalt {
        secs: 1_573_467_610,
        nanos: 300,
    };

    pub fn from_timestamp(secs: i64, nanos: u32) -> Result<Self> {
        if nanos >= 1_000_000_000 {
            return Err(CodecError::InvalidConfig(format!(
                "epoch nanoseconds out of range: {nanos}"
            )));
        }
        Ok(Self { secs, nanos })
    }

    pub fn from_rfc3339(value: &str) -> Result<Self> {
        let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|err| {
            CodecError::InvalidConfig(format!("invalid epoch timestamp {value:?}: {err}"))
        })?;
        let utc = parsed.with_timezone(&Utc);
        Self::from_timestamp(utc.timestamp(), utc.timestamp_subsec_nanos())
    }

    pub fn to_rfc3339(&self) -> String {
        Utc.timestamp_opt(self.secs, self.nanos)
            .single()
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            .unwrap_or_else(|| format!("{}.{:09}", self.secs, self.nanos))
    }

    /// Salt bytes fed to the KDF and bound as AEAD associated data.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SALT_DOMAIN.len() + 12);
        bytes.extend_from_slice(SALT_DOMAIN);
        bytes.extend_from_slice(&self.secs.to_be_bytes());
        bytes.extend_from_slice(&self.nanos.to_be_bytes());
        bytes
    }
}

impl Default for EpochSalt {
    fn default() -> Self {
        Self::PROTOCOL
    }
}

impl fmt::Display for EpochSalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Derive a 256-bit cipher key from key material with Argon2id.
pub fn derive_key(material: &[u8], rounds: u32, epoch: &EpochSalt) -> Result<[u8; 32]> {
    let params = Params::new(KDF_MEMORY_KIB, rounds, KDF_LANES, Some(32))
        .map_err(|e| CodecError::InvalidConfig(format!("invalid KDF parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(material, &epoch.as_bytes(), &mut key)
        .map_err(|e| CodecError::InvalidConfig(format!("key derivation failed: {e}")))?;
    Ok(key)
}
