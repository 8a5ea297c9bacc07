/*! Errors enum for onion packets.
*/

use cookie_factory::GenError;
use thiserror::Error;

/// Error that can happen when calling `get_payload` of packet.
#[derive(Debug, PartialEq, Error)]
pub enum GetPayloadError {
    /// Error indicates that received payload of encrypted packet can't be decrypted
    #[error("Decrypt payload error")]
    Decrypt,
    /// Error indicates that decrypted payload of packet can't be parsed
    #[error("Deserialize payload error: {:?}, data: {:?}", error, payload)]
    Deserialize {
        /// Parsing error
        error: nom::Err<nom::error::Error<Vec<u8>>>,
        /// Received payload of packet
        payload: Vec<u8>,
    },
}

impl GetPayloadError {
    pub(crate) fn decrypt() -> GetPayloadError {
        GetPayloadError::Decrypt
    }

    pub(crate) fn deserialize(e: nom::Err<nom::error::Error<&[u8]>>, payload: Vec<u8>) -> GetPayloadError {
        GetPayloadError::Deserialize { error: e.to_owned(), payload }
    }
}

/// Error that can happen when building an encrypted packet with `new`.
#[derive(Debug, Error)]
pub enum BuildPacketError {
    /// Payload or packet doesn't fit into its serialization buffer.
    #[error("Serialize packet error: {:?}", error)]
    Serialize {
        /// Serialization error
        error: GenError,
    },
    /// Encryption primitive refused to seal the payload.
    #[error("Encrypt payload error")]
    Encrypt,
    /// Serialized packet would exceed the maximum size of its kind.
    #[error("Packet is too long: {} > {}", len, max)]
    TooLong {
        /// Size the packet would have
        len: usize,
        /// Maximum size allowed for this packet kind
        max: usize,
    },
}

impl From<GenError> for BuildPacketError {
    fn from(error: GenError) -> BuildPacketError {
        BuildPacketError::Serialize { error }
    }
}
