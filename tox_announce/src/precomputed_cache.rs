//! LRU cache for `SalsaBox`es.

use std::num::NonZeroUsize;

use lru::LruCache;

use tox_crypto::*;

/// LRU cache for `SalsaBox`es.
///
/// Calculation of `SalsaBox` from the `PublicKey`-`SecretKey` pair is an
/// expensive operation. `SalsaBox`es should be cached whenever possible
/// and reused later.
pub struct PrecomputedCache {
    sk: SecretKey,
    precomputed_keys: LruCache<PublicKey, SalsaBox>,
}

impl PrecomputedCache {
    /// Create new `PrecomputedCache`.
    pub fn new(sk: SecretKey, capacity: NonZeroUsize) -> PrecomputedCache {
        PrecomputedCache {
            sk,
            precomputed_keys: LruCache::new(capacity),
        }
    }

    /// Get `SalsaBox` for the given `PublicKey`.
    pub fn get(&mut self, pk: PublicKey) -> SalsaBox {
        if let Some(precomputed_key) = self.precomputed_keys.get(&pk) {
            return precomputed_key.clone();
        }

        let precomputed_key = SalsaBox::new(&pk, &self.sk);
        self.precomputed_keys.put(pk, precomputed_key.clone());
        precomputed_key
    }
}
