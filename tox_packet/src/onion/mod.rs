/*! Onion announce UDP Packets
*/

mod onion_announce_request;
mod onion_announce_response;
mod inner_onion_response;
mod onion_data_request;
mod onion_data_response;
mod onion_response_3;
mod friend_request;

pub use self::onion_announce_request::*;
pub use self::onion_announce_response::*;
pub use self::inner_onion_response::*;
pub use self::onion_data_request::*;
pub use self::onion_data_response::*;
pub use self::onion_response_3::*;
pub use self::friend_request::*;

use tox_binary_io::*;
use tox_crypto::*;

use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::{rest, value},
};

/// Size of serialized `IpPort` with padding, as stored in every onion return layer.
const SIZE_IPPORT: usize = 19;

const ONION_SEND_BASE: usize = PUBLICKEYBYTES + SIZE_IPPORT + MACBYTES;
const ONION_SEND_1: usize = NONCEBYTES + ONION_SEND_BASE * 3;
/// Maximum size of the data that can be sent through an onion path.
pub const MAX_ONION_DATA_SIZE: usize = ONION_MAX_PACKET_SIZE - (ONION_SEND_1 + 1); // 1 is for packet_id

/// The maximum size of onion packet including public key, nonce, packet kind
/// byte, onion return.
pub const ONION_MAX_PACKET_SIZE: usize = 1400;

/// Size of ping id that is sent in `OnionAnnounceRequest`.
pub const PING_ID_SIZE: usize = 32;

/// Maximum size of extra data that can be appended to a single
/// announce request or carried per node in an announce response.
pub const ONION_MAX_EXTRA_DATA_SIZE: usize = 136;

/// Maximum number of nodes sent in `OnionAnnounceResponse`.
pub const MAX_SENT_NODES: usize = 4;

/// Minimum size of `InnerOnionAnnounceRequest`: packet kind, nonce, sender
/// `PublicKey` and encrypted ping id, searched `PublicKey`, data `PublicKey`
/// and sendback data.
pub const ONION_ANNOUNCE_REQUEST_MIN_SIZE: usize =
    1 + NONCEBYTES + PUBLICKEYBYTES + PING_ID_SIZE + PUBLICKEYBYTES + PUBLICKEYBYTES + 8 + MACBYTES; // 177
/// Maximum size of `InnerOnionAnnounceRequest` with extra data.
pub const ONION_ANNOUNCE_REQUEST_MAX_SIZE: usize = ONION_ANNOUNCE_REQUEST_MIN_SIZE + ONION_MAX_EXTRA_DATA_SIZE; // 313

/// Minimum size of `OnionAnnounceResponse`: packet kind, announce status,
/// sendback data, nonce and encrypted ping id.
pub const ONION_ANNOUNCE_RESPONSE_MIN_SIZE: usize = 2 + 8 + NONCEBYTES + PING_ID_SIZE + MACBYTES; // 82
/// Maximum size of `OnionAnnounceResponse` with extra data.
pub const ONION_ANNOUNCE_RESPONSE_MAX_SIZE: usize =
    ONION_ANNOUNCE_RESPONSE_MIN_SIZE + ONION_MAX_EXTRA_DATA_SIZE * MAX_SENT_NODES; // 626

/// Minimum size of `InnerOnionDataRequest` with empty data.
pub const ONION_DATA_REQUEST_MIN_SIZE: usize = 1 + PUBLICKEYBYTES + NONCEBYTES + PUBLICKEYBYTES + MACBYTES; // 105
/// Maximum size in bytes of the data carried by `InnerOnionDataRequest`.
pub const MAX_DATA_REQUEST_SIZE: usize = MAX_ONION_DATA_SIZE - ONION_DATA_REQUEST_MIN_SIZE; // 1069
/// Minimum size of `OnionDataResponse` with empty data.
pub const ONION_DATA_RESPONSE_MIN_SIZE: usize = 1 + NONCEBYTES + PUBLICKEYBYTES + MACBYTES; // 73
/// Maximum size in bytes of `OnionDataResponseInnerPayload`.
pub const MAX_ONION_CLIENT_DATA_SIZE: usize = MAX_DATA_REQUEST_SIZE - (PUBLICKEYBYTES + MACBYTES);

/// Size of first `OnionReturn` struct with no inner `OnionReturn`s.
pub const ONION_RETURN_1_SIZE: usize = NONCEBYTES + SIZE_IPPORT + MACBYTES; // 59
/// Size of second `OnionReturn` struct with one inner `OnionReturn`.
pub const ONION_RETURN_2_SIZE: usize = NONCEBYTES + SIZE_IPPORT + MACBYTES + ONION_RETURN_1_SIZE; // 118
/// Size of third `OnionReturn` struct with two inner `OnionReturn`s.
pub const ONION_RETURN_3_SIZE: usize = NONCEBYTES + SIZE_IPPORT + MACBYTES + ONION_RETURN_2_SIZE; // 177

/** Encrypted onion return addresses.

When DHT node receives OnionRequest packet it appends `OnionReturn` to the end
of the next request packet it will send. So when DHT node receives OnionResponse
packet it will know where to send the next response packet by decrypting
`OnionReturn` from received packet. If node can't decrypt `OnionReturn` that
means that onion path is expired and packet should be dropped.

The announce node never decrypts it: the return is stored as an owned value next
to the announced key and is handed back to the onion layer together with the
response.

Serialized form:

Length                | Content
--------              | ------
`24`                  | `Nonce`
`35` or `94` or `153` | Payload

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionReturn {
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Encrypted payload
    pub payload: Vec<u8>,
}

impl FromBytes for OnionReturn {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, OnionReturn { nonce, payload: payload.to_vec() }))
    }
}

impl ToBytes for OnionReturn {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.payload.as_slice())
        )
    }
}

/** Form of an announce packet.

Legacy announce packets (`0x83`/`0x84`) have a fixed layout. Extended packets
(`0x87`/`0x88`) carry a node count byte and extra data after the nodes.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AnnounceFormat {
    /// `0x83` requests and `0x84` responses
    Legacy,
    /// `0x87` requests and `0x88` responses
    Extended,
}

impl AnnounceFormat {
    /// Packet kind byte of the announce request of this form.
    pub fn request_kind(self) -> u8 {
        match self {
            AnnounceFormat::Legacy => 0x83,
            AnnounceFormat::Extended => 0x87,
        }
    }

    /// Packet kind byte of the announce response of this form.
    pub fn response_kind(self) -> u8 {
        match self {
            AnnounceFormat::Legacy => 0x84,
            AnnounceFormat::Extended => 0x88,
        }
    }

    /// Maximum size of the request of this form. Legacy requests can't carry
    /// extra data so their size is always the minimum.
    pub fn request_max_size(self) -> usize {
        match self {
            AnnounceFormat::Legacy => ONION_ANNOUNCE_REQUEST_MIN_SIZE,
            AnnounceFormat::Extended => ONION_ANNOUNCE_REQUEST_MAX_SIZE,
        }
    }

    fn request_from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            value(AnnounceFormat::Legacy, tag(&[0x83][..])),
            value(AnnounceFormat::Extended, tag(&[0x87][..])),
        ))(input)
    }

    fn response_from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            value(AnnounceFormat::Legacy, tag(&[0x84][..])),
            value(AnnounceFormat::Extended, tag(&[0x88][..])),
        ))(input)
    }
}

/** Represents the result of sent `AnnounceRequest`.

Also known as `is_stored` number.

*/
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnnounceStatus {
    /// Failed to announce ourselves or find requested node
    Failed = 0,
    /// Requested node is found by its long term `PublicKey`
    Found = 1,
    /// We successfully announced ourselves
    Announced = 2,
}

impl FromBytes for AnnounceStatus {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        alt((
            value(AnnounceStatus::Failed, tag(&[0][..])),
            value(AnnounceStatus::Found, tag(&[1][..])),
            value(AnnounceStatus::Announced, tag(&[2][..])),
        ))(input)
    }
}

impl ToBytes for AnnounceStatus {
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        gen_be_u8!(buf, *self as u8)
    }
}
