/*! Errors enums for onion announce node.
*/

use futures::channel::mpsc::SendError;
use thiserror::Error;

use tox_crypto::*;
use tox_packet::errors::*;

/// Error that can happen when handling onion packets addressed to announce node.
#[derive(Debug, Error)]
pub enum HandleRequestError {
    /// Packet length is out of bounds for its kind.
    #[error("Invalid packet size: {}", len)]
    InvalidSize {
        /// Length of the received packet
        len: usize,
    },
    /// Packet kind is not handled by announce node.
    #[error("Unknown packet kind: 0x{:02x}", kind)]
    UnknownKind {
        /// Packet kind byte
        kind: u8,
    },
    /// Packet can't be parsed.
    #[error("Deserialize packet error: {:?}", error)]
    Deserialize {
        /// Parsing error
        error: nom::Err<nom::error::Error<Vec<u8>>>,
    },
    /// Encrypted payload can't be decrypted or parsed.
    #[error("Get payload error")]
    GetPayload(#[source] GetPayloadError),
    /// No announced node with public key.
    #[error("No announced node with public key {:?}", pk)]
    NoAnnouncedNode {
        /// Destination `PublicKey` of data request
        pk: PublicKey,
    },
    /// Response can't be built.
    #[error("Build response error")]
    Serialize(#[source] BuildPacketError),
}

impl From<GetPayloadError> for HandleRequestError {
    fn from(error: GetPayloadError) -> HandleRequestError {
        HandleRequestError::GetPayload(error)
    }
}

impl From<BuildPacketError> for HandleRequestError {
    fn from(error: BuildPacketError) -> HandleRequestError {
        HandleRequestError::Serialize(error)
    }
}

/// Error that can happen when handling `OnionDataResponse` packet.
#[derive(Debug, PartialEq, Error)]
pub enum HandleDataResponseError {
    /// Error indicates that we received invalid payload.
    #[error("Invalid payload")]
    InvalidPayload(#[source] GetPayloadError),
    /// Error indicates that we received invalid inner payload.
    #[error("Invalid inner payload")]
    InvalidInnerPayload(#[source] GetPayloadError),
    /// Error indicates that sending friend request to the sink failed.
    #[error("Send friend request error")]
    FriendRequest(#[source] SendError),
    /// Error indicates that sending data to the sink failed.
    #[error("Send data error")]
    Data(#[source] SendError),
}
