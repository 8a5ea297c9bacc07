/*! OnionDataRequest packet
*/

use super::*;

use crypto_box::aead::{Aead, Error as AeadError};

use crate::errors::*;

use nom::{
    bytes::complete::{tag, take},
    combinator::{map_parser, rest, rest_len, verify},
};

/// Maximum size of `InnerOnionDataRequest`.
pub const ONION_DATA_REQUEST_MAX_SIZE: usize = ONION_DATA_REQUEST_MIN_SIZE + MAX_DATA_REQUEST_SIZE;

/** It's used to send data requests to dht node using onion paths.

When DHT node receives `OnionDataRequest` it sends `OnionDataResponse` to
destination node for which data request is intended. Thus, data request will
go through 7 intermediate nodes until destination node gets it - 3 nodes with
OnionRequests, onion node that handles `OnionDataRequest` and 3 nodes with
OnionResponses.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x85`
`32`     | `PublicKey` of destination node
`24`     | `Nonce`
`32`     | Temporary `PublicKey`
variable | Payload

where payload is encrypted [`OnionDataResponsePayload`](./struct.OnionDataResponsePayload.html)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerOnionDataRequest {
    /// `PublicKey` of destination node
    pub destination_pk: PublicKey,
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Temporary `PublicKey` for the current encrypted payload
    pub temporary_pk: PublicKey,
    /// Encrypted payload
    pub payload: Vec<u8>,
}

impl FromBytes for InnerOnionDataRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[0x85][..])(input)?;
        // 1 is for the packet kind that is already consumed
        let (input, _) = verify(rest_len, |len| {
            *len + 1 >= ONION_DATA_REQUEST_MIN_SIZE && *len + 1 <= ONION_DATA_REQUEST_MAX_SIZE
        })(input)?;
        let (input, destination_pk) = PublicKey::from_bytes(input)?;
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, temporary_pk) = PublicKey::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, InnerOnionDataRequest {
            destination_pk,
            nonce,
            temporary_pk,
            payload: payload.to_vec()
        }))
    }
}

impl ToBytes for InnerOnionDataRequest {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(0x85) >>
            gen_slice!(self.destination_pk.as_bytes()) >>
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.temporary_pk.as_bytes()) >>
            gen_slice!(self.payload.as_slice()) >>
            gen_len_limit(ONION_DATA_REQUEST_MAX_SIZE)
        )
    }
}

impl InnerOnionDataRequest {
    /** Create `InnerOnionDataRequest` from `OnionDataResponsePayload`
    encrypting it with `shared_secret` and `nonce`.

    The same nonce is used for the inner `OnionDataResponsePayload` layer which
    is encrypted with a different key. It must never be reused for another
    request.
    */
    pub fn new(
        shared_secret: &SalsaBox,
        destination_pk: PublicKey,
        temporary_pk: PublicKey,
        nonce: Nonce,
        payload: &OnionDataResponsePayload
    ) -> Result<InnerOnionDataRequest, BuildPacketError> {
        let len = payload.size();
        if len > MAX_DATA_REQUEST_SIZE {
            return Err(BuildPacketError::TooLong { len, max: MAX_DATA_REQUEST_SIZE });
        }

        let mut buf = [0; MAX_DATA_REQUEST_SIZE];
        let (_, size) = payload.to_bytes((&mut buf, 0))?;
        let payload = shared_secret.encrypt((&nonce).into(), &buf[..size])
            .map_err(|AeadError| BuildPacketError::Encrypt)?;

        Ok(InnerOnionDataRequest {
            destination_pk,
            nonce,
            temporary_pk,
            payload,
        })
    }

    /** Decrypt payload and try to parse it as `OnionDataResponsePayload`.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `OnionDataResponsePayload`
    */
    pub fn get_payload(&self, shared_secret: &SalsaBox) -> Result<OnionDataResponsePayload, GetPayloadError> {
        let decrypted = shared_secret.decrypt((&self.nonce).into(), self.payload.as_slice())
            .map_err(|AeadError| GetPayloadError::decrypt())?;
        match OnionDataResponsePayload::from_bytes(&decrypted) {
            Err(error) => Err(GetPayloadError::deserialize(error, decrypted.clone())),
            Ok((_, inner)) => Ok(inner),
        }
    }
}

/** Same as `InnerOnionDataRequest` but with `OnionReturn` addresses. It's sent
from the third node from onion chain to the destination node.

See [`InnerOnionDataRequest`](./struct.InnerOnionDataRequest.html) for additional docs.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x85`
`32`     | `PublicKey` of destination node
`24`     | `Nonce`
`32`     | Temporary `PublicKey`
variable | Payload
`177`    | `OnionReturn`

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionDataRequest {
    /// Inner onion data request that was enclosed in onion packets
    pub inner: InnerOnionDataRequest,
    /// Return address encrypted by the third node from onion chain
    pub onion_return: OnionReturn
}

impl FromBytes for OnionDataRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, rest_len) = verify(rest_len, |len| *len <= ONION_MAX_PACKET_SIZE && *len >= ONION_RETURN_3_SIZE)(input)?;
        let (input, inner) = map_parser(take(rest_len - ONION_RETURN_3_SIZE), InnerOnionDataRequest::from_bytes)(input)?;
        let (input, onion_return) = OnionReturn::from_bytes(input)?;
        Ok((input, OnionDataRequest { inner, onion_return }))
    }
}

impl ToBytes for OnionDataRequest {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_call!(|buf, inner| InnerOnionDataRequest::to_bytes(inner, buf), &self.inner) >>
            gen_call!(|buf, onion_return| OnionReturn::to_bytes(onion_return, buf), &self.onion_return) >>
            gen_len_limit(ONION_MAX_PACKET_SIZE)
        )
    }
}
