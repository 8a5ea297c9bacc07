/*! OnionDataResponse packet
*/

use super::*;

use crypto_box::aead::{Aead, Error as AeadError};

use crate::errors::*;

use nom::{
    bytes::complete::tag,
    combinator::{map, rest, rest_len, verify},
    number::complete::le_u8,
};

/** When onion node receives `OnionDataRequest` packet it converts it to
`OnionDataResponse` and sends to destination node if it announced itself
and is contained in onion nodes list.

Serialized form:

Length   | Content
-------- | ------
`1`      | `0x86`
`24`     | `Nonce`
`32`     | Temporary `PublicKey`
variable | Payload

where payload is encrypted [`OnionDataResponsePayload`](./struct.OnionDataResponsePayload.html)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionDataResponse {
    /// Nonce for the current encrypted payload
    pub nonce: Nonce,
    /// Temporary `PublicKey` for the current encrypted payload
    pub temporary_pk: PublicKey,
    /// Encrypted payload
    pub payload: Vec<u8>
}

impl FromBytes for OnionDataResponse {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = verify(rest_len, |len| {
            *len >= ONION_DATA_RESPONSE_MIN_SIZE && *len <= ONION_MAX_PACKET_SIZE
        })(input)?;
        let (input, _) = tag(&[0x86][..])(input)?;
        let (input, nonce) = Nonce::from_bytes(input)?;
        let (input, temporary_pk) = PublicKey::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, OnionDataResponse {
            nonce,
            temporary_pk,
            payload: payload.to_vec()
        }))
    }
}

impl ToBytes for OnionDataResponse {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_be_u8!(0x86) >>
            gen_slice!(self.nonce.as_ref()) >>
            gen_slice!(self.temporary_pk.as_bytes()) >>
            gen_slice!(self.payload.as_slice()) >>
            gen_len_limit(ONION_MAX_PACKET_SIZE)
        )
    }
}

impl OnionDataResponse {
    /// Create `OnionDataResponse` from `OnionDataResponsePayload` encrypting it
    /// with `shared_secret` and `nonce`
    pub fn new(
        shared_secret: &SalsaBox,
        temporary_pk: PublicKey,
        nonce: Nonce,
        payload: &OnionDataResponsePayload
    ) -> Result<OnionDataResponse, BuildPacketError> {
        let len = payload.size();
        if len > MAX_DATA_REQUEST_SIZE {
            return Err(BuildPacketError::TooLong { len, max: MAX_DATA_REQUEST_SIZE });
        }

        let mut buf = [0; MAX_DATA_REQUEST_SIZE];
        let (_, size) = payload.to_bytes((&mut buf, 0))?;
        let payload = shared_secret.encrypt((&nonce).into(), &buf[..size])
            .map_err(|AeadError| BuildPacketError::Encrypt)?;

        Ok(OnionDataResponse {
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

impl From<InnerOnionDataRequest> for OnionDataResponse {
    /// Onion node forwards the encrypted payload of the request untouched.
    fn from(request: InnerOnionDataRequest) -> Self {
        OnionDataResponse {
            nonce: request.nonce,
            temporary_pk: request.temporary_pk,
            payload: request.payload,
        }
    }
}

/** Unencrypted payload of `OnionDataResponse` packet.

Inner payload is encrypted with long term `PublicKey` to prove to the receiver
that the sender owns it.

Serialized form:

Length   | Content
-------- | ------
`32`     | Long term `PublicKey`
variable | Payload

where payload is encrypted [`OnionDataResponseInnerPayload`](./enum.OnionDataResponseInnerPayload.html)

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionDataResponsePayload {
    /// Long term `PublicKey` that was used for the inner encrypted payload.
    pub real_pk: PublicKey,
    /// Inner encrypted payload.
    pub payload: Vec<u8>,
}

impl FromBytes for OnionDataResponsePayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, real_pk) = PublicKey::from_bytes(input)?;
        let (input, payload) = rest(input)?;
        Ok((input, OnionDataResponsePayload {
            real_pk,
            payload: payload.to_vec()
        }))
    }
}

impl ToBytes for OnionDataResponsePayload {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        do_gen!(buf,
            gen_slice!(self.real_pk.as_bytes()) >>
            gen_slice!(self.payload.as_slice())
        )
    }
}

impl OnionDataResponsePayload {
    /// Create `OnionDataResponsePayload` from `OnionDataResponseInnerPayload`
    /// encrypting it with `shared_secret` and `nonce`
    pub fn new(
        shared_secret: &SalsaBox,
        real_pk: PublicKey,
        nonce: &Nonce,
        payload: &OnionDataResponseInnerPayload
    ) -> Result<OnionDataResponsePayload, BuildPacketError> {
        let mut buf = [0; MAX_ONION_CLIENT_DATA_SIZE];
        let (_, size) = payload.to_bytes((&mut buf, 0))?;
        let payload = shared_secret.encrypt(nonce.into(), &buf[..size])
            .map_err(|AeadError| BuildPacketError::Encrypt)?;

        Ok(OnionDataResponsePayload {
            real_pk,
            payload,
        })
    }

    /// Number of bytes this payload occupies when serialized.
    pub fn size(&self) -> usize {
        PUBLICKEYBYTES + self.payload.len()
    }

    /** Decrypt payload and try to parse it as `OnionDataResponseInnerPayload`.

    Returns `Error` in case of failure:

    - fails to decrypt
    - fails to parse as `OnionDataResponseInnerPayload`
    */
    pub fn get_payload(&self, nonce: &Nonce, shared_secret: &SalsaBox) -> Result<OnionDataResponseInnerPayload, GetPayloadError> {
        let decrypted = shared_secret.decrypt(nonce.into(), self.payload.as_slice())
            .map_err(|AeadError| GetPayloadError::decrypt())?;
        match OnionDataResponseInnerPayload::from_bytes(&decrypted) {
            Err(error) => Err(GetPayloadError::deserialize(error, decrypted.clone())),
            Ok((_, inner)) => Ok(inner),
        }
    }
}

/** Packet that is embedded in the payload of
[`OnionDataResponsePayload`](./struct.OnionDataResponsePayload.html).

The first byte is the packet kind. Friend requests are decoded, other kinds
belong to layers above the announce protocol and are kept as raw bytes.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OnionDataResponseInnerPayload {
    /// [`FriendRequest`](./struct.FriendRequest.html) structure.
    FriendRequest(FriendRequest),
    /// Packet of any other kind.
    Other {
        /// Packet kind
        kind: u8,
        /// Packet data following the kind byte
        data: Vec<u8>,
    },
}

impl OnionDataResponseInnerPayload {
    /// Packet kind byte.
    pub fn kind(&self) -> u8 {
        match *self {
            OnionDataResponseInnerPayload::FriendRequest(_) => FRIEND_REQUEST_KIND,
            OnionDataResponseInnerPayload::Other { kind, .. } => kind,
        }
    }
}

impl FromBytes for OnionDataResponseInnerPayload {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = verify(rest_len, |len| *len <= MAX_ONION_CLIENT_DATA_SIZE)(input)?;
        alt((
            map(FriendRequest::from_bytes, OnionDataResponseInnerPayload::FriendRequest),
            OnionDataResponseInnerPayload::other_from_bytes,
        ))(input)
    }
}

impl OnionDataResponseInnerPayload {
    fn other_from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, kind) = verify(le_u8, |kind| *kind != FRIEND_REQUEST_KIND)(input)?;
        let (input, data) = rest(input)?;
        Ok((input, OnionDataResponseInnerPayload::Other { kind, data: data.to_vec() }))
    }
}

impl ToBytes for OnionDataResponseInnerPayload {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        match *self {
            OnionDataResponseInnerPayload::FriendRequest(ref p) => p.to_bytes(buf),
            OnionDataResponseInnerPayload::Other { kind, ref data } => do_gen!(buf,
                gen_be_u8!(kind) >>
                gen_slice!(data.as_slice()) >>
                gen_len_limit(MAX_ONION_CLIENT_DATA_SIZE)
            ),
        }
    }
}
