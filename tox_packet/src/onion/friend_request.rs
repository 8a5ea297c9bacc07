/*! FriendRequest packet
*/

use super::*;

use std::str;

use nom::{
    bytes::complete::tag,
    combinator::{map_res, rest, verify},
};

/// Packet kind of `FriendRequest` inside `OnionDataResponseInnerPayload`.
pub const FRIEND_REQUEST_KIND: u8 = 0x20;

/// Number of bytes of the nospam value.
pub const NOSPAMBYTES: usize = 4;

/// Maximum size in bytes of the message of `FriendRequest`.
pub const MAX_FRIEND_REQUEST_MESSAGE_SIZE: usize = MAX_ONION_CLIENT_DATA_SIZE - (1 + NOSPAMBYTES);

/** Friend request that can be delivered through onion data packets.

Serialized form:

Length      | Content
----------- | ------
`1`         | `0x20`
`4`         | NoSpam
`1..=1016`  | Message

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FriendRequest {
    /// Nospam part of the Tox ID the request is sent to
    pub nospam: [u8; NOSPAMBYTES],
    /// Friend request message
    pub message: String,
}

impl FriendRequest {
    /// Create new object
    pub fn new(nospam: [u8; NOSPAMBYTES], message: String) -> Self {
        FriendRequest { nospam, message }
    }
}

impl FromBytes for FriendRequest {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = tag(&[FRIEND_REQUEST_KIND][..])(input)?;
        let (input, nospam) = <[u8; NOSPAMBYTES]>::from_bytes(input)?;
        let (input, message) = map_res(
            verify(rest, |message: &[u8]| !message.is_empty() && message.len() <= MAX_FRIEND_REQUEST_MESSAGE_SIZE),
            str::from_utf8,
        )(input)?;
        Ok((input, FriendRequest {
            nospam,
            message: message.to_string(),
        }))
    }
}

impl ToBytes for FriendRequest {
    #[rustfmt::skip]
    fn to_bytes<'a>(&self, buf: (&'a mut [u8], usize)) -> Result<(&'a mut [u8], usize), GenError> {
        if self.message.is_empty() {
            return gen_error(buf, 0);
        }
        do_gen!(buf,
            gen_be_u8!(FRIEND_REQUEST_KIND) >>
            gen_slice!(self.nospam.as_ref()) >>
            gen_slice!(self.message.as_bytes()) >>
            gen_len_limit(1 + NOSPAMBYTES + MAX_FRIEND_REQUEST_MESSAGE_SIZE)
        )
    }
}
