//! # Packet module
//!
//! Handles everything in relationship to packets.
//!
//! Each packet type parses from a [`bytes::Buf`] holding exactly its body, and serializes
//! its body through [`crate::ser::Serialize`]. Headers are handled by [`PacketHeader`] and
//! [`PacketTrait::to_writer_with_header`].

mod header;
mod many;
mod packet_sum;

mod compressed_data;
mod key;
mod literal_data;
mod one_pass_signature;
mod public_key_encrypted_session_key;
mod signature;
mod sym_encrypted_protected_data;
mod user_id;

pub use self::{
    compressed_data::*,
    header::PacketHeader,
    key::*,
    literal_data::*,
    many::*,
    one_pass_signature::*,
    packet_sum::*,
    public_key_encrypted_session_key::*,
    signature::*,
    sym_encrypted_protected_data::*,
    user_id::*,
};
pub(crate) use self::header::read_new_length;

