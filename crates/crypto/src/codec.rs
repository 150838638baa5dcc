use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;
use peerlink_types::PeerAddress;
use std::collections::HashMap;
use tracing::debug;
use zeroize::Zeroizing;

use crate::encryption::{self, NONCE_LEN, TAG_LEN};
use crate::errors::{CodecError, Result};
use crate::key_management::{derive_key, CipherKeys, EpochSalt, KeyRole};

pub const TOKEN_VERSION: u8 = 1;
pub const DEFAULT_ROUNDS: u32 = 10;
/// Upper bound on the round count accepted from a token, so a hostile entry
/// cannot make every decoder burn unbounded KDF time.
pub const MAX_ROUNDS: u32 = 64;

const HEADER_LEN: usize = 1 + 4;
const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// A registry entry that decoded successfully, with its raw position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub index: usize,
    pub address: PeerAddress,
}

/// Encodes peer addresses into registry tokens and back.
///
/// Token layout before base64 (URL-safe, unpadded):
/// `version (1) ‖ rounds (u32 BE) ‖ nonce (12) ‖ ciphertext ‖ tag (16)`.
/// The round count travels with the token so entries written by nodes using a
/// different strength still decode, as long as key and epoch match.
pub struct CipherCodec {
    keys: CipherKeys,
    rounds: u32,
    epoch: EpochSalt,
    derived: Mutex<HashMap<(KeyRole, u32), Zeroizing<[u8; 32]>>>,
}

impl CipherCodec {
    pub fn new(keys: CipherKeys, rounds: u32, epoch: EpochSalt) -> Result<Self> {
        validate_rounds(rounds).map_err(CodecError::InvalidConfig)?;
        Ok(Self {
            keys,
            rounds,
            epoch,
            derived: Mutex::new(HashMap::new()),
        })
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn epoch(&self) -> EpochSalt {
        self.epoch
    }

    /// Seal a single address with the encode key.
    pub fn encode(&self, address: &str) -> Result<String> {
        let address = PeerAddress::parse(address)
            .map_err(|e| CodecError::Encode(format!("malformed address: {e}")))?;
        self.encode_address(&address)
    }

    pub fn encode_address(&self, address: &PeerAddress) -> Result<String> {
        let key = self.key_for(KeyRole::Encode, self.rounds)?;
        let nonce = encryption::generate_nonce();
        let sealed = encryption::seal(
            &key,
            &nonce,
            address.as_str().as_bytes(),
            &self.epoch.as_bytes(),
        )?;

        let mut raw = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed.len());
        raw.push(TOKEN_VERSION);
        raw.extend_from_slice(&self.rounds.to_be_bytes());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Open a single token with the decode key.
    pub fn decode(&self, token: &str) -> Result<PeerAddress> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CodecError::Decode(format!("invalid token encoding: {e}")))?;
        if raw.len() < MIN_TOKEN_LEN {
            return Err(CodecError::Decode(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(CodecError::Decode(format!(
                "unsupported token version {}",
                raw[0]
            )));
        }

        let mut rounds_bytes = [0u8; 4];
        rounds_bytes.copy_from_slice(&raw[1..HEADER_LEN]);
        let rounds = u32::from_be_bytes(rounds_bytes);
        validate_rounds(rounds).map_err(CodecError::Decode)?;

        let nonce = &raw[HEADER_LEN..HEADER_LEN + NONCE_LEN];
        let ciphertext = &raw[HEADER_LEN + NONCE_LEN..];
        let key = self.key_for(KeyRole::Decode, rounds)?;
        let plaintext = encryption::open(&key, nonce, ciphertext, &self.epoch.as_bytes())?;

        let text = String::from_utf8(plaintext)
            .map_err(|_| CodecError::Decode("payload is not valid UTF-8".into()))?;
        PeerAddress::parse(&text).map_err(|e| CodecError::Decode(format!("payload: {e}")))
    }

    /// Decode a raw registry list, keeping the original index of every entry
    /// that decodes. Entries that do not decode are skipped.
    pub fn decode_entries(&self, tokens: &[String]) -> Vec<DecodedEntry> {
        tokens
            .iter()
            .enumerate()
            .filter_map(|(index, token)| match self.decode(token) {
                Ok(address) => Some(DecodedEntry { index, address }),
                Err(err) => {
                    debug!(index, error = %err, "skipping undecodable registry entry");
                    None
                }
            })
            .collect()
    }

    /// Encode a batch, skipping addresses that fail individually.
    pub fn encode_addresses<'a, I>(&self, addresses: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a PeerAddress>,
    {
        addresses
            .into_iter()
            .filter_map(|address| match self.encode_address(address) {
                Ok(token) => Some(token),
                Err(err) => {
                    debug!(%address, error = %err, "skipping address that failed to encode");
                    None
                }
            })
            .collect()
    }

    fn key_for(&self, role: KeyRole, rounds: u32) -> Result<Zeroizing<[u8; 32]>> {
        if let Some(key) = self.derived.lock().get(&(role, rounds)) {
            return Ok(key.clone());
        }

        // Derivation runs outside the lock; a racing thread may derive the same key twice.
        let key = Zeroizing::new(
            derive_key(self.keys.material(role), rounds, &self.epoch).map_err(|e| match role {
                KeyRole::Decode => CodecError::Decode(e.to_string()),
                KeyRole::Encode => CodecError::Encode(e.to_string()),
            })?,
        );
        self.derived.lock().insert((role, rounds), key.clone());
        Ok(key)
    }
}

fn validate_rounds(rounds: u32) -> std::result::Result<(), String> {
    if rounds == 0 || rounds > MAX_ROUNDS {
        return Err(format!("round count {rounds} outside 1..={MAX_ROUNDS}"));
    }
    Ok(())
}
