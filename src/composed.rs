//! Handle OpenPGP objects that are composed of multiple packets, such as
//! [Transferable Public Key]s and [Message]s.
//!
//! See <https://www.rfc-editor.org/rfc/rfc9580#name-packet-sequence-composition>
//!
//! Key generation is handled with [`SecretKeyParamsBuilder`].
//!
//! Generated keys are [`SignedSecretKey`]s, their public half is a [`SignedPublicKey`].
//! Those key objects can encrypt and decrypt [`Message`]s, as well as produce and verify
//! signatures within messages. They can also produce and verify [`DetachedSignature`]s.
//!
//! [Transferable Public Key]: https://www.rfc-editor.org/rfc/rfc9580#name-transferable-public-keys
//! [Message]: https://www.rfc-editor.org/rfc/rfc9580#name-openpgp-messages

mod key;
mod message;
mod shared;
mod signature;
mod signed_key;

pub use self::key::*;
pub use self::message::*;
pub use self::shared::*;
pub use self::signature::*;
pub use self::signed_key::*;
