use nom::IResult;
use nom::combinator::map;

use crypto_box::{PublicKey, KEY_SIZE};

use super::FromBytes;

// Any 32 bytes are accepted: tox nodes in the wild still send announce
// requests with fake keys that have the high bit set.
impl FromBytes for PublicKey {
    fn from_bytes(input: &[u8]) -> IResult<&[u8], Self> {
        map(<[u8; KEY_SIZE]>::from_bytes, PublicKey::from)(input)
    }
}
