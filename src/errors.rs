use std::num::TryFromIntError;

use snafu::{Backtrace, Snafu};

use crate::types::KeyId;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

pub use crate::parsing::{Error as ParsingError, RemainingError};

/// Error types
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid input"))]
    InvalidInput,
    #[snafu(display("invalid armor wrappers"))]
    InvalidArmorWrappers,
    #[snafu(display("invalid crc24 checksum"))]
    InvalidChecksum,
    #[snafu(transparent)]
    Base64Decode { source: base64::DecodeError },
    #[snafu(display("no matching packet found"))]
    NoMatchingPacket,
    #[snafu(display("more than one matching packet was found"))]
    TooManyPackets,
    #[snafu(transparent)]
    RSAError { source: rsa::errors::Error },
    #[snafu(transparent)]
    IO {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    #[snafu(display("cfb: invalid key iv length"))]
    CfbInvalidKeyIvLength,
    #[snafu(display("Not yet implemented: {message}"))]
    Unimplemented { message: String },
    /// Signals packet versions and parameters we don't support, but can safely ignore
    #[snafu(display("Unsupported: {message}"))]
    Unsupported { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
    #[snafu(transparent)]
    Utf8Error { source: std::str::Utf8Error },
    #[snafu(transparent)]
    TryFromInt { source: TryFromIntError },
    #[snafu(transparent)]
    PacketParsing { source: ParsingError },

    /// Generating key material failed, either because the entropy source
    /// failed or because the key algorithm rejected the parameters.
    #[snafu(display("key generation failed: {message}"))]
    KeyGeneration { message: String },
    /// The secret key could not be unlocked with the supplied passphrase.
    #[snafu(display("invalid passphrase for secret key"))]
    Passphrase,
    /// None of the encrypted session keys is addressed to the supplied key.
    #[snafu(display("no encrypted session key matches key {key_id:?}"))]
    KeyMismatch { key_id: KeyId },
    /// The decrypted payload failed its modification detection check.
    #[snafu(display("integrity check failed: {message}"))]
    Integrity { message: String },
    /// Strict verification found no signature in the decrypted message.
    #[snafu(display("message was not signed"))]
    NotSigned,
    /// Strict verification found a signature that does not validate.
    #[snafu(display("failed to verify signature with key {key_id:?}"))]
    VerificationFailed { key_id: KeyId },
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::CfbInvalidKeyIvLength
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::Message {
            message: err.to_string(),
        }
    }
}

#[macro_export]
macro_rules! unimplemented_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unimplemented { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unimplemented { message: format!($fmt, $($arg)+)})
    };
}

#[macro_export]
macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unsupported { message: $e.to_string()})
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unsupported { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            bail!($fmt, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => ({
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`"#, left_val, right_val)
                }
            }
        }
    });
    ($left:expr, $right:expr,) => ({
        $crate::ensure_eq!($left, $right)
    });
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::bail!(r#"assertion failed: `(left == right)`
  left: `{:?}`,
 right: `{:?}`: {}"#, left_val, right_val,
                           format_args!($($arg)+))
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_distinct() {
        let not_signed = Error::NotSigned;
        let failed = Error::VerificationFailed {
            key_id: KeyId::from([1u8; 8]),
        };

        assert!(matches!(not_signed, Error::NotSigned));
        assert!(matches!(failed, Error::VerificationFailed { .. }));
        assert_eq!(not_signed.to_string(), "message was not signed");
    }
}
