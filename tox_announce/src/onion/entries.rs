/*! List of announced onion nodes.
*/

use std::cmp::Ordering;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tox_crypto::*;
use tox_packet::onion::*;
use crate::distance::Distance;

/** Path that should be used to send packets back to announced node.

It's an owned copy of the onion return from the announce request together
with the address of the last onion hop.

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReturnPath {
    /// Address of the node that delivered announce request to us
    pub saddr: SocketAddr,
    /// Onion return that should be used to send packets to announced node
    pub onion_return: OnionReturn,
}

/** Entry that corresponds to announced onion node.

When node successfully announce itself this entry is added to announced nodes
list. It's considered expired after announce timeout.

*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnounceEntry {
    /// Long term PublicKey of announced node
    pub pk: PublicKey,
    /// Path to announced node
    pub return_path: ReturnPath,
    /// PublicKey that should be used to encrypt data packets for announced node
    pub data_pk: PublicKey,
    /// Time when this entry was added or refreshed
    pub time: Instant,
}

impl AnnounceEntry {
    /// Check if this entry is timed out.
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.time) > timeout
    }
}

/// Result of `AnnounceStore::upsert`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Upsert<'a> {
    /// Entry was inserted or refreshed.
    Stored(&'a AnnounceEntry),
    /// List is full and all entries are closer to the anchor than the new one.
    Rejected,
}

/** Bounded list of announce entries.

Entries are kept sorted by distance to the anchor `PublicKey` so the
farthest entry is always the last one and lookup by `PublicKey` is a binary
search. XOR with the anchor is a bijection, so two different keys are never
at the same distance and the order is total.

*/
#[derive(Clone, Debug)]
pub struct AnnounceStore {
    anchor: PublicKey,
    entries: Vec<AnnounceEntry>,
    capacity: usize,
    timeout: Duration,
}

impl AnnounceStore {
    /// Create new empty `AnnounceStore`.
    pub fn new(anchor: PublicKey, capacity: usize, timeout: Duration) -> AnnounceStore {
        AnnounceStore {
            anchor,
            entries: Vec::with_capacity(capacity),
            capacity,
            timeout,
        }
    }

    /// Number of stored entries including timed out ones that were not swept yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no stored entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterator over stored entries, closest to the anchor first.
    pub fn iter(&self) -> impl Iterator<Item = &AnnounceEntry> {
        self.entries.iter()
    }

    fn search(&self, pk: &PublicKey) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| self.anchor.distance(&e.pk, pk))
    }

    /// Find entry by its `PublicKey` ignoring timed out entries.
    pub fn find(&self, pk: &PublicKey, now: Instant) -> Option<&AnnounceEntry> {
        self.search(pk)
            .ok()
            .map(|idx| &self.entries[idx])
            .filter(|e| !e.is_timed_out(now, self.timeout))
    }

    /** Get up to `MAX_SENT_NODES` live entries closest to `target`.

    Entries are sorted by distance to `target`. Entry with `exclude` key is
    skipped.

    */
    pub fn closest(&self, target: &PublicKey, exclude: &PublicKey, now: Instant) -> Vec<&AnnounceEntry> {
        let mut closest = self.entries.iter()
            .filter(|e| &e.pk != exclude && !e.is_timed_out(now, self.timeout))
            .collect::<Vec<_>>();
        closest.sort_by(|e1, e2| match target.distance(&e1.pk, &e2.pk) {
            Ordering::Equal => e2.time.cmp(&e1.time),
            ordering => ordering,
        });
        closest.truncate(MAX_SENT_NODES);
        closest
    }

    /// Remove all timed out entries. Returns the number of removed entries.
    pub fn expire(&mut self, now: Instant) -> usize {
        let len = self.entries.len();
        let timeout = self.timeout;
        self.entries.retain(|e| !e.is_timed_out(now, timeout));
        len - self.entries.len()
    }

    /** Try to add announce entry to the list.

    Firstly we remove all timed out entries. Then if:
    - the list already contains entry with such `PublicKey` then update
      entry and return it
    - the list with new entry does not exceed the capacity add entry to the
      list and return it
    - the farthest entry from the anchor is farther than new entry then
      replace it with new entry

    */
    pub fn upsert(&mut self, entry: AnnounceEntry) -> Upsert {
        let now = entry.time;
        self.expire(now);
        match self.search(&entry.pk) {
            Ok(idx) => {
                // node with such pk already announced - just update the entry
                self.entries[idx] = entry;
                Upsert::Stored(&self.entries[idx])
            },
            Err(idx) => {
                if self.entries.len() < self.capacity {
                    // adding new entry does not exceed the limit - just add it
                    self.entries.insert(idx, entry);
                    Upsert::Stored(&self.entries[idx])
                } else if idx < self.capacity {
                    // the farthest entry is farther than new entry - replace it
                    if let Some(evicted) = self.entries.pop() {
                        trace!("Evicting announce entry {:?}", evicted.pk);
                    }
                    self.entries.insert(idx, entry);
                    Upsert::Stored(&self.entries[idx])
                } else {
                    Upsert::Rejected
                }
            }
        }
    }
}
