/*! OnionAnnounceResponse packet with OnionAnnounceResponsePayload
*/

use super::*;

use crypto_box::aead::{Aead, Error as AeadError};
use rand::{CryptoRng, Rng};

use crate::errors::*;
use crate::packed_node::*;

use nom::{
    combinator::{eof, rest, rest_len, success, verify},
    multi::{count, many0},
    number::complete::{le_u64, le_u8},
};

/// Size of the unencrypted part of `OnionAnnounceResponse` plus the
/// authentication tag: packet kind, sendback data, nonce and MAC.
pub const ONION_ANNOUNCE_RESPONSE_OVERHEAD: usize = 1 + 8 + NONCEBYTES + MACBYTES;

/** It's used to respond to `OnionAnnounceRequest` packet.

sendback_data is the data from `OnionAnnounceRequest` that should be sent in the
response as is. It's used in onion client to match onion response with sent
request.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x84` or `0x88`
`8`      | Data to send back in response
`24`     | `Nonce`
variable | Payload

where payload is encrypted [`OnionAnnounceResponsePayload`](./struct.OnionAnnounceResponsePayload.html)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionAnnounceResponse {
    /// Form of the response, the same as the form of the request
    pub format: AnnounceFormat,
    /// Data to send back in response
    pub sendback_data: u64,
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Encrypted payload
    pub payload: Vec<u8>,
}

impl FromBytes for OnionAnnounceResponse {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = verify(rest_len, |len| {
            *len >= ONION_ANNOUNCE_RESPONSE_MIN_SIZE && *len <= ONION_ANNOUNCE_RESPONSE_MAX_SIZE
        })(input)?;
        let (input, format) = AnnounceFormat::response_from_bytes(input)?;
        let (input, sendback_data) = le_u64(input)?;
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, OnionAnnounceResponse {
            format,
            sendback_data,
            nonce,
            payload: payload.to_vec(),
        }))
    }
}

impl ToBytes for OnionAnnounceResponse {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(self.format.response_kind()) >>
            gen_le_u64!(self.sendback_data) >>
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.payload.as_slice()) >>
            gen_len_limit(ONION_ANNOUNCE_RESPONSE_MAX_SIZE)
        )
    }
}

impl OnionAnnounceResponse {
    /// Create new `OnionAnnounceResponse` object sealing the payload with a
    /// fresh nonce.
    ///
    /// Fails if the packet would exceed `ONION_ANNOUNCE_RESPONSE_MAX_SIZE` or
    /// if the payload can't be represented in the given form.
    pub fn new<R: Rng + CryptoRng>(
        rng: &mut R,
        shared_secret: &SalsaBox,
        format: AnnounceFormat,
        sendback_data: u64,
        payload: &OnionAnnounceResponsePayload,
    ) -> Result<OnionAnnounceResponse, BuildPacketError> {
        let len = ONION_ANNOUNCE_RESPONSE_OVERHEAD + payload.size(format);
        if len > ONION_ANNOUNCE_RESPONSE_MAX_SIZE {
            return Err(BuildPacketError::TooLong { len, max: ONION_ANNOUNCE_RESPONSE_MAX_SIZE });
        }

        let nonce = gen_nonce(rng);
        let mut buf = [0; ONION_ANNOUNCE_RESPONSE_MAX_SIZE];
        let (_, size) = payload.to_bytes((&mut buf, 0), format)?;
        let payload = shared_secret.encrypt((&nonce).into(), &buf[..size])
            .map_err(|AeadError| BuildPacketError::Encrypt)?;

        Ok(OnionAnnounceResponse {
            format,
            sendback_data,
            nonce,
            payload,
        })
    }

    /** Decrypt payload and try to parse it as `OnionAnnounceResponsePayload`.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `OnionAnnounceResponsePayload`
    */
    pub fn get_payload(&self, shared_secret: &SalsaBox) -> Result<OnionAnnounceResponsePayload, GetPayloadError> {
        let decrypted = shared_secret.decrypt((&self.nonce).into(), self.payload.as_slice())
            .map_err(|AeadError| GetPayloadError::decrypt())?;
        match OnionAnnounceResponsePayload::from_bytes(&decrypted, self.format) {
            Err(error) => Err(GetPayloadError::deserialize(error, decrypted.clone())),
            Ok((_, inner)) => Ok(inner),
        }
    }
}

/** Unencrypted payload of `OnionAnnounceResponse` packet.

`announce_status` variable contains the result of sent request. It might have
values:

* 0: failed to announce ourselves or find requested node
* 1: requested node is found by its long term `PublicKey`
* 2: we successfully announced ourselves

In case of announce_status is equal to 1 ping_id will contain `PublicKey` that
should be used to send data packets to the requested node. In other cases it
will contain ping id that should be used for announcing ourselves.

Serialized form of `0x84` responses:

Length     | Content
--------   | ------
`1`        | `announce_status` (aka `is_stored`)
`32`       | Onion ping id or `PublicKey`
`[0, 204]` | Nodes in packed format

Serialized form of `0x88` responses:

Length     | Content
--------   | ------
`1`        | `announce_status` (aka `is_stored`)
`32`       | Onion ping id or `PublicKey`
`1`        | Number of nodes
`[0, 204]` | Nodes in packed format
variable   | Extra data

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionAnnounceResponsePayload {
    /// Variable that represents result of sent `OnionAnnounceRequest`. Also known
    /// as `is_stored` variable
    pub announce_status: AnnounceStatus,
    /// Onion ping id or PublicKey that should be used to send data packets
    pub ping_id_or_pk: [u8; PING_ID_SIZE],
    /// Up to 4 closest to the requested PublicKey DHT nodes
    pub nodes: Vec<PackedNode>,
    /// Data appended by the extra data producer, always empty in `0x84` responses
    pub extra_data: Vec<u8>,
}

impl OnionAnnounceResponsePayload {
    /// Parse the payload of a response of the given form.
    pub fn from_bytes(input: &[u8], format: AnnounceFormat) -> IResult<&[u8], Self> {
        let (input, announce_status) = AnnounceStatus::from_bytes(input)?;
        let (input, ping_id_or_pk) = <[u8; PING_ID_SIZE]>::from_bytes(input)?;
        let (input, nodes, extra_data) = match format {
            AnnounceFormat::Legacy => {
                let (input, nodes) = many0(PackedNode::from_bytes)(input)?;
                let (input, _) = verify(success(nodes.len()), |len| *len <= MAX_SENT_NODES)(input)?;
                let (input, _) = eof(input)?;
                (input, nodes, Vec::new())
            },
            AnnounceFormat::Extended => {
                let (input, nodes_count) = verify(le_u8, |len| usize::from(*len) <= MAX_SENT_NODES)(input)?;
                let (input, nodes) = count(PackedNode::from_bytes, usize::from(nodes_count))(input)?;
                let (input, extra_data) = rest(input)?;
                (input, nodes, extra_data.to_vec())
            },
        };
        Ok((input, OnionAnnounceResponsePayload {
            announce_status,
            ping_id_or_pk,
            nodes,
            extra_data,
        }))
    }

    /// Serialize the payload in the given form.
    #[rustfmt::skip]
    pub fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize), format: AnnounceFormat) -> Result<(&'a mut [u8], usize), GenError> {
        if self.nodes.len() > MAX_SENT_NODES {
            return gen_error(buf, 0);
        }
        match format {
            AnnounceFormat::Legacy => {
                if !self.extra_data.is_empty() {
                    return gen_error(buf, 0);
                }
                do_gen!(buf,
                    gen_call!(|buf, announce_status| AnnounceStatus::to_bytes(announce_status, buf), &self.announce_status) >>
                    gen_slice!(self.ping_id_or_pk.as_ref()) >>
                    gen_many_ref!(&self.nodes, |buf, node| PackedNode::to_bytes(node, buf))
                )
            },
            AnnounceFormat::Extended => {
                do_gen!(buf,
                    gen_call!(|buf, announce_status| AnnounceStatus::to_bytes(announce_status, buf), &self.announce_status) >>
                    gen_slice!(self.ping_id_or_pk.as_ref()) >>
                    gen_be_u8!(self.nodes.len() as u8) >>
                    gen_many_ref!(&self.nodes, |buf, node| PackedNode::to_bytes(node, buf)) >>
                    gen_slice!(self.extra_data.as_slice())
                )
            },
        }
    }

    /// Number of bytes this payload occupies when serialized in the given form.
    pub fn size(&self, format: AnnounceFormat) -> usize {
        let nodes_size: usize = self.nodes.iter().map(PackedNode::size).sum();
        let nodes_count_size = match format {
            AnnounceFormat::Legacy => 0,
            AnnounceFormat::Extended => 1,
        };
        1 + PING_ID_SIZE + nodes_count_size + nodes_size + self.extra_data.len()
    }

    /// Number of extra data bytes that can still be appended to this payload
    /// without exceeding `ONION_ANNOUNCE_RESPONSE_MAX_SIZE`.
    pub fn extra_data_budget(&self) -> usize {
        ONION_ANNOUNCE_RESPONSE_MAX_SIZE.saturating_sub(ONION_ANNOUNCE_RESPONSE_OVERHEAD + self.size(AnnounceFormat::Extended))
    }
}
