mod compression;
mod fingerprint;
mod key_id;
mod key_traits;
mod mpi;
mod packet;
mod params;
mod password;
mod s2k;

pub use self::{
    compression::CompressionAlgorithm,
    fingerprint::Fingerprint,
    key_id::KeyId,
    key_traits::{DecryptionKey, EncryptionKey, KeyDetails, SigningKey, VerifyingKey},
    mpi::Mpi,
    packet::*,
    params::*,
    password::Password,
    s2k::{StringToKey, DEFAULT_ITER_SALTED_COUNT},
};
