/*! XOR distance between public keys.
*/

use std::cmp::Ordering;

use tox_crypto::*;

/// Trait for functionality related to distance between `PublicKey`s.
pub trait Distance {
    /// Check whether distance between PK1 and own PK is smaller than distance
    /// between PK2 and own PK.
    fn distance(&self, pk1: &PublicKey, pk2: &PublicKey) -> Ordering;
}

impl Distance for PublicKey {
    fn distance(&self, pk1: &PublicKey, pk2: &PublicKey) -> Ordering {
        for i in 0..crypto_box::KEY_SIZE {
            if pk1.as_bytes()[i] != pk2.as_bytes()[i] {
                return Ord::cmp(&(self.as_bytes()[i] ^ pk1.as_bytes()[i]), &(self.as_bytes()[i] ^ pk2.as_bytes()[i]))
            }
        }
        Ordering::Equal
    }
}
