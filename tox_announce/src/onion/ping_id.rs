/*! Onion ping id.

Ping id is a token that proves that announce request came from the same
`PublicKey` and the same network path during the last two time windows. It's
not stored anywhere: announce node recomputes it for every request from a
random secret, so only the node that issued a ping id is able to verify it.
*/

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use hmac::digest::generic_array::GenericArray;
use rand::{CryptoRng, Rng};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use tox_binary_io::*;
use tox_crypto::*;
use tox_packet::onion::PING_ID_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// Onion ping id.
pub type PingId = [u8; PING_ID_SIZE];

/// Ping id filled with zeros. Clients send it on first contact.
pub const INITIAL_PING_ID: PingId = [0; PING_ID_SIZE];

/// Number of secret random bytes used as HMAC key. Equal to the block size
/// of SHA-256 so the key is used as is.
pub const SECRET_BYTES_SIZE: usize = 64;

/// Size of serialized `OnionPingData` struct.
const ONION_PING_DATA_SIZE: usize =
    /* window */ 8 +
    crypto_box::KEY_SIZE +
    /* ip_type */ 1 +
    /* ip_addr */ 16 +
    /* port */ 2;

/** Data on the basis of which onion ping id is calculated.

Format of this struct is not specified by tox protocol and can be different in
different implementations. That's possible because this struct is used for onion
ping id generation and only node that generated it can verify it.

Serialized form:

Length   | Content
-------- | ------
`8`      | Number of the time window
`32`     | `PublicKey` of sender
`1`      | IP type of sender
`16`     | `IpAddr` of sender, IPv4 is mapped to IPv6
`2`      | Port of sender

*/
struct OnionPingData<'a> {
    window: u64,
    pk: &'a PublicKey,
    addr: SocketAddr,
}

impl<'a> ToBytes for OnionPingData<'a> {
    fn to_bytes<'b>(&self, buf: (&'b mut [u8], usize)) -> Result<(&'b mut [u8], usize), GenError> {
        let ip_addr = match self.addr.ip() {
            IpAddr::V4(v4) => IpAddr::V6(v4.to_ipv6_mapped()),
            v6 => v6,
        };
        do_gen!(buf,
            gen_be_u64!(self.window) >>
            gen_slice!(self.pk.as_bytes()) >>
            gen_be_u8!(self.addr.is_ipv4() as u8) >>
            gen_call!(|buf, ip_addr| IpAddr::to_bytes(ip_addr, buf), &ip_addr) >>
            gen_be_u16!(self.addr.port())
        )
    }
}

/** Issues and verifies onion ping ids.

Ping id is `HMAC-SHA256(secret, window | pk | ip | port)` where `window` is
the number of whole `timeout` intervals passed since the authenticator was
created. A ping id issued in window `w` is accepted in windows `w` and `w + 1`.

*/
pub struct PingIdAuthenticator {
    secret: Zeroizing<[u8; SECRET_BYTES_SIZE]>,
    created: Instant,
    timeout: Duration,
}

impl PingIdAuthenticator {
    /// Create new `PingIdAuthenticator` with a random secret.
    pub fn new<R: Rng + CryptoRng>(rng: &mut R, created: Instant, timeout: Duration) -> PingIdAuthenticator {
        PingIdAuthenticator {
            secret: PingIdAuthenticator::gen_secret(rng),
            created,
            timeout,
        }
    }

    fn gen_secret<R: Rng + CryptoRng>(rng: &mut R) -> Zeroizing<[u8; SECRET_BYTES_SIZE]> {
        let mut secret = Zeroizing::new([0; SECRET_BYTES_SIZE]);
        rng.fill_bytes(&mut secret[..]);
        secret
    }

    /// Replace the secret. All ping ids issued before become invalid.
    pub fn rotate_secret<R: Rng + CryptoRng>(&mut self, rng: &mut R) {
        self.secret = PingIdAuthenticator::gen_secret(rng);
    }

    fn window(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.created).as_secs() / self.timeout.as_secs().max(1)
    }

    fn ping_id(&self, window: u64, pk: &PublicKey, addr: SocketAddr) -> PingId {
        let data = OnionPingData { window, pk, addr };
        let mut buf = [0; ONION_PING_DATA_SIZE];
        // can not fail since buf has enough length
        let size = data.to_bytes((&mut buf, 0)).map_or(ONION_PING_DATA_SIZE, |(_, size)| size);
        let mut mac = <HmacSha256 as Mac>::new(GenericArray::from_slice(&self.secret[..]));
        mac.update(&buf[..size]);
        mac.finalize().into_bytes().into()
    }

    /// Ping id for the current time window.
    pub fn issue(&self, now: Instant, pk: &PublicKey, addr: SocketAddr) -> PingId {
        self.ping_id(self.window(now), pk, addr)
    }

    /// Check that ping id was issued for this `PublicKey` and address in the
    /// current or the previous time window.
    pub fn verify(&self, now: Instant, pk: &PublicKey, addr: SocketAddr, ping_id: &PingId) -> bool {
        let window = self.window(now);
        let current = self.ping_id(window, pk, addr)[..].ct_eq(&ping_id[..]);
        let previous = match window.checked_sub(1) {
            Some(previous) => self.ping_id(previous, pk, addr)[..].ct_eq(&ping_id[..]),
            None => 0u8.into(),
        };
        (current | previous).into()
    }
}
