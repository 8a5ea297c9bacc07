/*! OnionAnnounceRequest packet with OnionAnnounceRequestPayload
*/

use super::*;

use crypto_box::aead::{Aead, Error as AeadError};
use rand::{CryptoRng, Rng};

use crate::errors::*;

use nom::{
    bytes::complete::take,
    combinator::{map_parser, rest, rest_len, verify},
    number::complete::le_u64,
};

/// Size of `OnionAnnounceRequestPayload` without extra data.
const ONION_ANNOUNCE_REQUEST_PAYLOAD_MIN_SIZE: usize = PING_ID_SIZE + PUBLICKEYBYTES * 2 + 8;

/** It's used for announcing ourselves to onion node and for looking for other
announced nodes.

If we want to announce ourselves we should send one `OnionAnnounceRequest`
packet with PingId set to 0 to acquire correct PingId of onion node. Then using
this PingId we can send another `OnionAnnounceRequest` to be added to onion
nodes list. If `OnionAnnounceRequest` succeed we will get `OnionAnnounceResponse`
with announce_status set to 2. Otherwise announce_status will be set to 0.

If we are looking for another node we should send `OnionAnnounceRequest` packet
with PingId set to 0 and with `PublicKey` of this node. If node is found we will
get `OnionAnnounceResponse` with announce_status set to 1 and the data
`PublicKey` of the found node.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x83` or `0x87`
`24`     | `Nonce`
`32`     | `PublicKey` of the sender
variable | Payload

where payload is encrypted [`OnionAnnounceRequestPayload`](./struct.OnionAnnounceRequestPayload.html).
Legacy (`0x83`) packets are exactly `ONION_ANNOUNCE_REQUEST_MIN_SIZE` bytes long,
extended (`0x87`) packets may be up to `ONION_ANNOUNCE_REQUEST_MAX_SIZE` bytes.

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerOnionAnnounceRequest {
    /// Form of the request
    pub format: AnnounceFormat,
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Temporary or real `PublicKey` for the current encrypted payload
    pub pk: PublicKey,
    /// Encrypted payload
    pub payload: Vec<u8>,
}

impl FromBytes for InnerOnionAnnounceRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, format) = AnnounceFormat::request_from_bytes(input)?;
        // 1 is for the packet kind that is already consumed
        let (input, _) = verify(rest_len, |len| {
            *len + 1 >= ONION_ANNOUNCE_REQUEST_MIN_SIZE && *len + 1 <= format.request_max_size()
        })(input)?;
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, pk) = PublicKey::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, InnerOnionAnnounceRequest {
            format,
            nonce,
            pk,
            payload: payload.to_vec(),
        }))
    }
}

impl ToBytes for InnerOnionAnnounceRequest {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(self.format.request_kind()) >>
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.pk.as_bytes()) >>
            gen_slice!(self.payload.as_slice()) >>
            gen_len_limit(self.format.request_max_size())
        )
    }
}

impl InnerOnionAnnounceRequest {
    /// Create new `InnerOnionAnnounceRequest` object sealing the payload with
    /// a fresh nonce.
    ///
    /// Fails if the packet would exceed the maximum size of its form.
    pub fn new<R: Rng + CryptoRng>(
        rng: &mut R,
        shared_secret: &SalsaBox,
        format: AnnounceFormat,
        pk: PublicKey,
        payload: &OnionAnnounceRequestPayload,
    ) -> Result<InnerOnionAnnounceRequest, BuildPacketError> {
        let len = ONION_ANNOUNCE_REQUEST_MIN_SIZE + payload.extra_data.len();
        if len > format.request_max_size() {
            return Err(BuildPacketError::TooLong { len, max: format.request_max_size() });
        }

        let nonce = gen_nonce(rng);
        let mut buf = [0; ONION_ANNOUNCE_REQUEST_MAX_SIZE];
        let (_, size) = payload.to_bytes((&mut buf, 0))?;
        let payload = shared_secret.encrypt((&nonce).into(), &buf[..size])
            .map_err(|AeadError| BuildPacketError::Encrypt)?;

        Ok(InnerOnionAnnounceRequest {
            format,
            nonce,
            pk,
            payload,
        })
    }

    /** Decrypt payload and try to parse it as `OnionAnnounceRequestPayload`.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `OnionAnnounceRequestPayload`
    */
    pub fn get_payload(&self, shared_secret: &SalsaBox) -> Result<OnionAnnounceRequestPayload, GetPayloadError> {
        let decrypted = shared_secret.decrypt((&self.nonce).into(), self.payload.as_slice())
            .map_err(|AeadError| GetPayloadError::decrypt())?;
        match OnionAnnounceRequestPayload::from_bytes(&decrypted) {
            Err(error) => Err(GetPayloadError::deserialize(error, decrypted.clone())),
            Ok((_, payload)) => Ok(payload),
        }
    }
}

/** Same as `InnerOnionAnnounceRequest` but with `OnionReturn` addresses. It's
sent from the third node from onion chain to the announce node.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x83` or `0x87`
`24`     | `Nonce`
`32`     | `PublicKey` of the sender
variable | Payload
`177`    | `OnionReturn`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionAnnounceRequest {
    /// Inner announce request that was enclosed in onion packets
    pub inner: InnerOnionAnnounceRequest,
    /// Return address encrypted by the third node from onion chain
    pub onion_return: OnionReturn,
}

impl FromBytes for OnionAnnounceRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, rest_len) = verify(rest_len, |len| *len <= ONION_MAX_PACKET_SIZE && *len >= ONION_RETURN_3_SIZE)(input)?;
        let (input, inner) = map_parser(take(rest_len - ONION_RETURN_3_SIZE), InnerOnionAnnounceRequest::from_bytes)(input)?;
        let (input, onion_return) = OnionReturn::from_bytes(input)?;
        Ok((input, OnionAnnounceRequest { inner, onion_return }))
    }
}

impl ToBytes for OnionAnnounceRequest {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_call!(|buf, inner| InnerOnionAnnounceRequest::to_bytes(inner, buf), &self.inner) >>
            gen_call!(|buf, onion_return| OnionReturn::to_bytes(onion_return, buf), &self.onion_return) >>
            gen_len_limit(ONION_MAX_PACKET_SIZE)
        )
    }
}

/** Unencrypted payload of `OnionAnnounceRequest` packet.

Serialized form:

Length     | Content
---------- | ------
`32`       | Onion ping id
`32`       | `PublicKey` we are searching for
`32`       | `PublicKey` that should be used for sending data packets
`8`        | Data to send back in response
`[0, 136]` | Extra data (only in `0x87` requests)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionAnnounceRequestPayload {
    /// Onion ping id
    pub ping_id: [u8; PING_ID_SIZE],
    /// `PublicKey` we are searching for
    pub search_pk: PublicKey,
    /// `PublicKey` that should be used for sending data packets
    pub data_pk: PublicKey,
    /// Data to send back in response
    pub sendback_data: u64,
    /// Opaque data for the extra data producer of the announce node
    pub extra_data: Vec<u8>,
}

impl FromBytes for OnionAnnounceRequestPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, ping_id) = <[u8; PING_ID_SIZE]>::from_bytes(input)?;
        let (input, search_pk) = PublicKey::from_bytes(input)?;
        let (input, data_pk) = PublicKey::from_bytes(input)?;
        let (input, sendback_data) = le_u64(input)?;
        let (input, extra_data) = verify(rest, |extra: &[u8]| extra.len() <= ONION_MAX_EXTRA_DATA_SIZE)(input)?;
        Ok((input, OnionAnnounceRequestPayload {
            ping_id,
            search_pk,
            data_pk,
            sendback_data,
            extra_data: extra_data.to_vec(),
        }))
    }
}

impl ToBytes for OnionAnnounceRequestPayload {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.ping_id.as_ref()) >>
            gen_slice!(self.search_pk.as_bytes()) >>
            gen_slice!(self.data_pk.as_bytes()) >>
            gen_le_u64!(self.sendback_data) >>
            gen_slice!(self.extra_data.as_slice()) >>
            gen_len_limit(ONION_ANNOUNCE_REQUEST_PAYLOAD_MIN_SIZE + ONION_MAX_EXTRA_DATA_SIZE)
        )
    }
}
