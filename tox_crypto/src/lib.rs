//! Functions for the core crypto.

use crypto_box::aead::generic_array::typenum::Unsigned;
use crypto_box::aead::AeadCore;
use rand::{CryptoRng, RngCore};

pub use crypto_box::{PublicKey, SecretKey, SalsaBox};

pub type Nonce = [u8; <SalsaBox as AeadCore>::NonceSize::USIZE];
/// Size of the nonce used with `SalsaBox`.
pub const NONCEBYTES: usize = <SalsaBox as AeadCore>::NonceSize::USIZE;
/// Size of the authentication tag appended by `SalsaBox`.
pub const MACBYTES: usize = <SalsaBox as AeadCore>::TagSize::USIZE;
/// Size of a `PublicKey`.
pub const PUBLICKEYBYTES: usize = crypto_box::KEY_SIZE;

/** Generate a fresh random nonce.

Every encrypted packet gets its own nonce drawn from the supplied RNG. Nonces
are never derived from counters shared between unrelated peers.
*/
pub fn gen_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> Nonce {
    let mut nonce = [0; NONCEBYTES];
    rng.fill_bytes(&mut nonce);
    nonce
}

/// Compute the shared `SalsaBox` for our `SecretKey` and their `PublicKey`.
pub fn precompute(their_pk: &PublicKey, our_sk: &SecretKey) -> SalsaBox {
    SalsaBox::new(their_pk, our_sk)
}
