//! Cipher codec for registry entries.
//!
//! Peer addresses are never written to the shared registry in clear text.
//! Each address is sealed with AES-256-GCM under a key derived (Argon2id) from
//! the node's pre-provisioned key material and the protocol epoch salt, then
//! packed into a URL-safe token.
//!
//! - `key_management`: key material, epoch salt and key derivation
//! - `encryption`: AEAD sealing and opening
//! - `codec`: token layout and batch helpers used by the sync engine

pub mod codec;
pub mod encryption;
pub mod errors;
pub mod key_management;

pub use codec::{CipherCodec, DecodedEntry, DEFAULT_ROUNDS, MAX_ROUNDS, TOKEN_VERSION};
pub use errors::CodecError;
pub use key_management::{CipherKeys, EpochSalt, KeyRole};
