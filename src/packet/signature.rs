mod config;
mod de;
mod ser;
mod subpacket;
mod types;

pub use self::config::{SignatureConfig, SignatureVersionSpecific};
pub use self::subpacket::{Subpacket, SubpacketData, SubpacketLength, SubpacketType};
pub use self::types::{KeyFlags, Signature, SignatureType, SignatureVersion};
