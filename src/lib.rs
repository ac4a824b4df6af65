//! # pgp-engine
//!
//! An OpenPGP message engine: it generates RSA key pairs, encrypts and signs content for one
//! or more recipients, and decrypts and verifies the resulting messages.
//!
//! The layers, from the bottom up:
//!
//! - [`crypto`]: hashes, OpenPGP CFB with modification detection, RSA.
//! - [`types`]: key ids, fingerprints, MPIs, S2K and the key capability traits.
//! - [`packet`]: the binary packet codec.
//! - [`armor`]: ASCII armor.
//! - [`composed`]: keys, messages and detached signatures made up of packets.
//! - [`Engine`]: the public operations, configured through [`EngineConfig`].

#![forbid(unsafe_code)]

// public so that the macros are usable
#[macro_use]
pub mod errors;

pub(crate) mod util;

pub mod armor;
pub mod composed;
pub mod crypto;
pub mod engine;
pub mod packet;
pub mod parsing;
pub mod ser;
pub mod types;

pub use self::composed::{
    ArmorOptions, Deserializable, DetachedSignature, Message, SecretKeyParams,
    SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey, VerificationResult,
};
pub use self::crypto::hash::HashAlgorithm;
pub use self::crypto::sym::SymmetricKeyAlgorithm;
pub use self::engine::{Engine, EngineConfig, EngineConfigBuilder, KeyPair};
pub use self::errors::{Error, Result};
pub use self::types::{CompressionAlgorithm, KeyDetails, KeyId, Password};
