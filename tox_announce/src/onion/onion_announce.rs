/*! The implementation of onion announce
*/

use std::net::SocketAddr;
use std::ops::RangeInclusive;

use rand::{CryptoRng, Rng};

use tox_binary_io::*;
use tox_crypto::*;
use tox_packet::onion::*;
use tox_packet::packed_node::PackedNode;
use crate::config::AnnounceConfig;
use crate::onion::entries::*;
use crate::onion::errors::*;
use crate::onion::extra_data::*;
use crate::onion::ping_id::*;
use crate::precomputed_cache::PrecomputedCache;
use crate::time::Clock;

/// Allowed sizes of `0x83` announce requests together with `OnionReturn`.
const LEGACY_ANNOUNCE_REQUEST_SIZE: usize = ONION_ANNOUNCE_REQUEST_MIN_SIZE + ONION_RETURN_3_SIZE;

/// Allowed sizes of `0x87` announce requests together with `OnionReturn`.
const EXTENDED_ANNOUNCE_REQUEST_SIZES: RangeInclusive<usize> =
    ONION_ANNOUNCE_REQUEST_MIN_SIZE + ONION_RETURN_3_SIZE ..= ONION_ANNOUNCE_REQUEST_MAX_SIZE + ONION_RETURN_3_SIZE;

/// Allowed sizes of `0x85` data requests together with `OnionReturn`.
const DATA_REQUEST_SIZES: RangeInclusive<usize> =
    ONION_DATA_REQUEST_MIN_SIZE + ONION_RETURN_3_SIZE ..= ONION_DATA_REQUEST_MAX_SIZE + ONION_RETURN_3_SIZE;

/** Holds list of announced onion nodes and process announce requests.

It's not thread safe and doesn't spawn any tasks: the host calls
`handle_packet` for every packet it receives and `expire` periodically.
Responses are returned to the host which should send them to the returned
address.

*/
pub struct OnionAnnounce {
    /// Short term DHT `PublicKey`. Entries are sorted by distance to it.
    dht_pk: PublicKey,
    /// LRU cache of `SalsaBox`es with requesters
    precomputed_keys: PrecomputedCache,
    /// Issues and verifies onion ping ids
    ping_ids: PingIdAuthenticator,
    /// List of announced onion nodes
    entries: AnnounceStore,
    /// Producer of extra data for `0x88` responses
    extra_data: Option<ExtraDataHook>,
    /// Source of current time
    clock: Box<dyn Clock + Send + Sync>,
}

impl OnionAnnounce {
    /// Create new `OnionAnnounce` instance.
    pub fn new<R: Rng + CryptoRng>(
        rng: &mut R,
        dht_sk: SecretKey,
        config: &AnnounceConfig,
        clock: Box<dyn Clock + Send + Sync>,
    ) -> OnionAnnounce {
        let dht_pk = dht_sk.public_key();
        let now = clock.now();
        OnionAnnounce {
            dht_pk: dht_pk.clone(),
            precomputed_keys: PrecomputedCache::new(dht_sk, config.shared_keys_cache_size),
            ping_ids: PingIdAuthenticator::new(rng, now, config.ping_id_timeout),
            entries: AnnounceStore::new(dht_pk, config.max_entries, config.announce_timeout),
            extra_data: None,
            clock,
        }
    }

    /// Short term DHT `PublicKey` of this node.
    pub fn dht_pk(&self) -> &PublicKey {
        &self.dht_pk
    }

    /// List of announced onion nodes.
    pub fn entries(&self) -> &AnnounceStore {
        &self.entries
    }

    /** Register producer of extra data for extended announce responses.

    `max_size` is capped to `MAX_EXTRA_DATA_PRODUCER_SIZE`. Producer is
    called only when the response has at least `max_size` free bytes.
    Previously registered producer is replaced.

    */
    pub fn set_extra_data_producer<P: ExtraDataProducer + 'static>(&mut self, max_size: usize, producer: P) {
        self.extra_data = Some(ExtraDataHook::new(max_size, producer));
    }

    /// Remove registered producer of extra data.
    pub fn clear_extra_data_producer(&mut self) {
        self.extra_data = None;
    }

    /// Replace the secret used for ping ids. All issued ping ids become invalid.
    pub fn rotate_secret<R: Rng + CryptoRng>(&mut self, rng: &mut R) {
        self.ping_ids.rotate_secret(rng);
    }

    /// Remove timed out announce entries. Returns the number of removed entries.
    pub fn expire(&mut self) -> usize {
        let removed = self.entries.expire(self.clock.now());
        if removed > 0 {
            trace!("Removed {} timed out announce entries", removed);
        }
        removed
    }

    /** Handle onion packet addressed to this node.

    Returns response and address where it should be sent. Malformed, forged
    and unanswerable packets are dropped silently.

    */
    pub fn handle_packet<R: Rng + CryptoRng>(
        &mut self,
        rng: &mut R,
        packet: &[u8],
        addr: SocketAddr,
    ) -> Option<(OnionResponse3, SocketAddr)> {
        match self.dispatch_packet(rng, packet, addr) {
            Ok(response) => Some(response),
            Err(e) => {
                debug!("Dropping onion packet from {}: {}", addr, e);
                None
            },
        }
    }

    fn dispatch_packet<R: Rng + CryptoRng>(
        &mut self,
        rng: &mut R,
        packet: &[u8],
        addr: SocketAddr,
    ) -> Result<(OnionResponse3, SocketAddr), HandleRequestError> {
        let len = packet.len();
        match packet.first() {
            Some(0x83) if len == LEGACY_ANNOUNCE_REQUEST_SIZE => {
                let request = parse_packet::<OnionAnnounceRequest>(packet)?;
                self.handle_announce_request(rng, request, addr)
            },
            Some(0x87) if EXTENDED_ANNOUNCE_REQUEST_SIZES.contains(&len) => {
                let request = parse_packet::<OnionAnnounceRequest>(packet)?;
                self.handle_announce_request(rng, request, addr)
            },
            Some(0x85) if DATA_REQUEST_SIZES.contains(&len) => {
                let request = parse_packet::<OnionDataRequest>(packet)?;
                self.handle_data_request(request)
            },
            Some(0x83) | Some(0x87) | Some(0x85) | None => Err(HandleRequestError::InvalidSize { len }),
            Some(&kind) => Err(HandleRequestError::UnknownKind { kind }),
        }
    }

    /** Handle `OnionAnnounceRequest` packet and build `OnionResponse3` packet
    that should be sent back through the same onion path.

    If the request contains valid onion ping id and searches for the sender
    itself it's considered as announce request and the sender is added to the
    announce list. Otherwise it's considered as search request. Response
    status is:

    - `Announced` when the sender is in the list with the same data
      `PublicKey`
    - `Found` when requested node is in the list; in this case the response
      contains its data `PublicKey` instead of ping id
    - `Failed` otherwise, including the first contact when the sender has no
      valid ping id yet

    Every response except `Found` contains fresh ping id for the sender.

    */
    pub fn handle_announce_request<R: Rng + CryptoRng>(
        &mut self,
        rng: &mut R,
        request: OnionAnnounceRequest,
        addr: SocketAddr,
    ) -> Result<(OnionResponse3, SocketAddr), HandleRequestError> {
        let now = self.clock.now();
        let format = request.inner.format;
        let request_pk = &request.inner.pk;
        let shared_secret = self.precomputed_keys.get(request_pk.clone());
        let payload = request.inner.get_payload(&shared_secret)?;

        let authenticated = self.ping_ids.verify(now, request_pk, addr, &payload.ping_id);
        let entry = if authenticated && &payload.search_pk == request_pk {
            let entry = AnnounceEntry {
                pk: request_pk.clone(),
                return_path: ReturnPath {
                    saddr: addr,
                    onion_return: request.onion_return.clone(),
                },
                data_pk: payload.data_pk.clone(),
                time: now,
            };
            match self.entries.upsert(entry) {
                Upsert::Stored(entry) => Some(entry),
                Upsert::Rejected => {
                    trace!("Announce list is full, {:?} is not stored", request_pk);
                    None
                },
            }
        } else {
            self.entries.find(&payload.search_pk, now)
        };

        let (announce_status, ping_id_or_pk) = match entry {
            Some(entry) if &entry.pk == request_pk => if entry.data_pk == payload.data_pk {
                // successfully announced ourselves
                (AnnounceStatus::Announced, self.ping_ids.issue(now, request_pk, addr))
            } else {
                // found ourselves with same long term pk but different data pk
                (AnnounceStatus::Failed, self.ping_ids.issue(now, request_pk, addr))
            },
            // requested node is found by its long term pk
            Some(entry) => (AnnounceStatus::Found, *entry.data_pk.as_bytes()),
            // requested node is not found or we failed to announce
            None => (AnnounceStatus::Failed, self.ping_ids.issue(now, request_pk, addr)),
        };

        let nodes = self.entries.closest(&payload.search_pk, request_pk, now)
            .into_iter()
            .map(|entry| PackedNode::new(entry.return_path.saddr, entry.pk.clone()))
            .collect::<Vec<_>>();

        let mut response_payload = OnionAnnounceResponsePayload {
            announce_status,
            ping_id_or_pk,
            nodes,
            extra_data: Vec::new(),
        };

        if let (AnnounceFormat::Extended, Some(hook)) = (format, self.extra_data.as_mut()) {
            let extra_data_request = ExtraDataRequest {
                requester_pk: request_pk,
                search_pk: &payload.search_pk,
                nodes_count: response_payload.nodes.len(),
                request_data: &payload.extra_data,
            };
            response_payload.extra_data = hook.produce(&extra_data_request, response_payload.extra_data_budget());
        }

        let response = OnionAnnounceResponse::new(rng, &shared_secret, format, payload.sendback_data, &response_payload)?;

        Ok((OnionResponse3 {
            onion_return: request.onion_return,
            payload: InnerOnionResponse::OnionAnnounceResponse(response),
        }, addr))
    }

    /** Handle data request and build `OnionResponse3` packet that should be
    sent to determined address.

    When onion node handles `OnionDataRequest` it checks if onion entry list
    contains destination node and when entry exists sends `OnionDataResponse`
    to this node through its onion path.

    */
    pub fn handle_data_request(&self, request: OnionDataRequest) -> Result<(OnionResponse3, SocketAddr), HandleRequestError> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.find(&request.inner.destination_pk, now) {
            let response = OnionResponse3 {
                onion_return: entry.return_path.onion_return.clone(),
                payload: InnerOnionResponse::OnionDataResponse(request.inner.into()),
            };
            Ok((response, entry.return_path.saddr))
        } else {
            Err(HandleRequestError::NoAnnouncedNode {
                pk: request.inner.destination_pk,
            })
        }
    }
}

fn parse_packet<T: FromBytes>(packet: &[u8]) -> Result<T, HandleRequestError> {
    match T::from_bytes(packet) {
        Ok((_, parsed)) => Ok(parsed),
        Err(error) => Err(HandleRequestError::Deserialize { error: error.to_owned() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use rand::thread_rng;

    use crate::time::TokioClock;

    const ONION_RETURN_3_PAYLOAD_SIZE: usize = ONION_RETURN_3_SIZE - NONCEBYTES;

    fn onion_return() -> OnionReturn {
        OnionReturn {
            nonce: [42; NONCEBYTES],
            payload: vec![42; ONION_RETURN_3_PAYLOAD_SIZE],
        }
    }

    fn addr() -> SocketAddr {
        "1.2.3.4:12345".parse().unwrap()
    }

    fn onion_announce(config: &AnnounceConfig) -> (OnionAnnounce, PublicKey) {
        let mut rng = thread_rng();
        let dht_sk = SecretKey::generate(&mut rng);
        let dht_pk = dht_sk.public_key();
        (OnionAnnounce::new(&mut rng, dht_sk, config, Box::new(TokioClock)), dht_pk)
    }

    fn request(
        dht_pk: &PublicKey,
        client_sk: &SecretKey,
        format: AnnounceFormat,
        payload: &OnionAnnounceRequestPayload,
    ) -> OnionAnnounceRequest {
        let shared_secret = SalsaBox::new(dht_pk, client_sk);
        let inner = InnerOnionAnnounceRequest::new(&mut thread_rng(), &shared_secret, format, client_sk.public_key(), payload).unwrap();
        OnionAnnounceRequest {
            inner,
            onion_return: onion_return(),
        }
    }

    fn announce_payload(ping_id: PingId, search_pk: PublicKey, data_pk: PublicKey) -> OnionAnnounceRequestPayload {
        OnionAnnounceRequestPayload {
            ping_id,
            search_pk,
            data_pk,
            sendback_data: 42,
            extra_data: Vec::new(),
        }
    }

    fn unpack(
        response: OnionResponse3,
        dht_pk: &PublicKey,
        client_sk: &SecretKey,
    ) -> (OnionAnnounceResponse, OnionAnnounceResponsePayload) {
        let response = match response.payload {
            InnerOnionResponse::OnionAnnounceResponse(response) => response,
            _ => panic!("unexpected response"),
        };
        let payload = response.get_payload(&SalsaBox::new(dht_pk, client_sk)).unwrap();
        (response, payload)
    }

    // announce `client_sk` and return the data pk it was announced with
    fn announce(onion_announce: &mut OnionAnnounce, client_sk: &SecretKey, addr: SocketAddr) -> PublicKey {
        let mut rng = thread_rng();
        let dht_pk = onion_announce.dht_pk().clone();
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut rng).public_key();

        let first = request(&dht_pk, client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk.clone(), data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut rng, first, addr).unwrap();
        let (_, payload) = unpack(response, &dht_pk, client_sk);

        let second = request(&dht_pk, client_sk, AnnounceFormat::Legacy, &announce_payload(payload.ping_id_or_pk, client_pk, data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut rng, second, addr).unwrap();
        let (_, payload) = unpack(response, &dht_pk, client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Announced);
        data_pk
    }

    #[tokio::test]
    async fn first_contact_gets_ping_id() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let request = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk, data_pk));
        let (response, saddr) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();

        assert_eq!(saddr, addr());
        assert_eq!(response.onion_return, onion_return());
        let (response, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(response.format, AnnounceFormat::Legacy);
        assert_eq!(response.sendback_data, 42);
        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
        assert_ne!(payload.ping_id_or_pk, INITIAL_PING_ID);
        assert!(payload.nodes.is_empty());
        assert!(onion_announce.entries().is_empty());
    }

    #[tokio::test]
    async fn announce_with_ping_id() {
        tokio::time::pause();
        let (mut onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());

        let data_pk = announce(&mut onion_announce, &client_sk, addr());

        assert_eq!(onion_announce.entries().len(), 1);
        let entry = onion_announce.entries().iter().next().unwrap();
        assert_eq!(entry.pk, client_sk.public_key());
        assert_eq!(entry.data_pk, data_pk);
        assert_eq!(entry.return_path, ReturnPath { saddr: addr(), onion_return: onion_return() });
    }

    #[tokio::test]
    async fn announce_with_ping_id_from_previous_window() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let first = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk.clone(), data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), first, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        tokio::time::advance(Duration::from_secs(350)).await;

        let second = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(payload.ping_id_or_pk, client_pk, data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), second, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Announced);
    }

    #[tokio::test]
    async fn ping_id_expires() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let first = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk.clone(), data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), first, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        tokio::time::advance(Duration::from_secs(600)).await;

        let second = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(payload.ping_id_or_pk, client_pk, data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), second, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
        assert!(onion_announce.entries().is_empty());
    }

    #[tokio::test]
    async fn ping_id_from_other_address_is_rejected() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let first = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk.clone(), data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), first, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        let second = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(payload.ping_id_or_pk, client_pk, data_pk));
        let other_addr = "5.6.7.8:12345".parse().unwrap();
        let (response, saddr) = onion_announce.handle_announce_request(&mut thread_rng(), second, other_addr).unwrap();
        assert_eq!(saddr, other_addr);
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
        assert!(onion_announce.entries().is_empty());
    }

    #[tokio::test]
    async fn reannounce_with_other_data_pk() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        announce(&mut onion_announce, &client_sk, addr());

        // search for ourselves without valid ping id
        let other_data_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let request = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk, other_data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
        assert_ne!(payload.ping_id_or_pk, INITIAL_PING_ID);
    }

    #[tokio::test]
    async fn search_finds_announced_node() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let announced_sk = SecretKey::generate(&mut thread_rng());
        let data_pk = announce(&mut onion_announce, &announced_sk, addr());

        let searcher_sk = SecretKey::generate(&mut thread_rng());
        let searcher_data_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let request = request(&dht_pk, &searcher_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, announced_sk.public_key(), searcher_data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, "5.6.7.8:12345".parse().unwrap()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &searcher_sk);

        assert_eq!(payload.announce_status, AnnounceStatus::Found);
        assert_eq!(payload.ping_id_or_pk, *data_pk.as_bytes());
        assert_eq!(payload.nodes, vec![PackedNode::new(addr(), announced_sk.public_key())]);
        assert_eq!(onion_announce.entries().len(), 1);
    }

    #[tokio::test]
    async fn search_for_unknown_node() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let announced_sk = SecretKey::generate(&mut thread_rng());
        announce(&mut onion_announce, &announced_sk, addr());

        let searcher_sk = SecretKey::generate(&mut thread_rng());
        let unknown_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let request = request(&dht_pk, &searcher_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, unknown_pk, data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &searcher_sk);

        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
        assert_eq!(payload.nodes.len(), 1);
    }

    #[tokio::test]
    async fn announced_node_is_not_returned_to_itself() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let data_pk = announce(&mut onion_announce, &client_sk, addr());

        let request = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_sk.public_key(), data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        // found by search, still announced
        assert_eq!(payload.announce_status, AnnounceStatus::Announced);
        assert!(payload.nodes.is_empty());
    }

    #[tokio::test]
    async fn entry_expires() {
        tokio::time::pause();
        let (mut onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        announce(&mut onion_announce, &client_sk, addr());

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(onion_announce.expire(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(onion_announce.expire(), 1);
        assert!(onion_announce.entries().is_empty());
    }

    #[tokio::test]
    async fn rotate_secret_invalidates_ping_id() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        let client_pk = client_sk.public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let first = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_pk.clone(), data_pk.clone()));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), first, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        onion_announce.rotate_secret(&mut thread_rng());

        let second = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(payload.ping_id_or_pk, client_pk, data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), second, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert_eq!(payload.announce_status, AnnounceStatus::Failed);
    }

    struct NodesCount;

    impl ExtraDataProducer for NodesCount {
        fn produce(&mut self, request: &ExtraDataRequest, out: &mut [u8]) -> Result<usize, ExtraDataError> {
            out[0] = request.nodes_count as u8;
            out[1..=request.request_data.len()].copy_from_slice(request.request_data);
            Ok(1 + request.request_data.len())
        }
    }

    #[tokio::test]
    async fn extended_response_carries_extra_data() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        onion_announce.set_extra_data_producer(16, NodesCount);
        let announced_sk = SecretKey::generate(&mut thread_rng());
        announce(&mut onion_announce, &announced_sk, addr());

        let searcher_sk = SecretKey::generate(&mut thread_rng());
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let mut payload = announce_payload(INITIAL_PING_ID, announced_sk.public_key(), data_pk);
        payload.extra_data = vec![1, 2, 3];
        let request = request(&dht_pk, &searcher_sk, AnnounceFormat::Extended, &payload);
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (response, payload) = unpack(response, &dht_pk, &searcher_sk);

        assert_eq!(response.format, AnnounceFormat::Extended);
        assert_eq!(payload.nodes.len(), 1);
        assert_eq!(payload.extra_data, vec![1, 1, 2, 3]);
    }

    #[tokio::test]
    async fn largest_producer_fits_response_without_nodes() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        onion_announce.set_extra_data_producer(MAX_EXTRA_DATA_PRODUCER_SIZE, NodesCount);
        let client_sk = SecretKey::generate(&mut thread_rng());
        let search_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let request = request(&dht_pk, &client_sk, AnnounceFormat::Extended, &announce_payload(INITIAL_PING_ID, search_pk, data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);

        assert!(payload.nodes.is_empty());
        assert_eq!(payload.extra_data, vec![0]);
    }

    #[tokio::test]
    async fn legacy_response_has_no_extra_data() {
        tokio::time::pause();
        let (mut onion_announce, dht_pk) = onion_announce(&AnnounceConfig::default());
        onion_announce.set_extra_data_producer(16, NodesCount);
        let client_sk = SecretKey::generate(&mut thread_rng());
        let data_pk = SecretKey::generate(&mut thread_rng()).public_key();

        let request = request(&dht_pk, &client_sk, AnnounceFormat::Legacy, &announce_payload(INITIAL_PING_ID, client_sk.public_key(), data_pk));
        let (response, _) = onion_announce.handle_announce_request(&mut thread_rng(), request, addr()).unwrap();
        let (_, payload) = unpack(response, &dht_pk, &client_sk);
        assert!(payload.extra_data.is_empty());

        onion_announce.clear_extra_data_producer();
        assert!(onion_announce.extra_data.is_none());
    }

    #[tokio::test]
    async fn handle_data_request_forwards_to_announced_node() {
        tokio::time::pause();
        let (mut onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let client_sk = SecretKey::generate(&mut thread_rng());
        announce(&mut onion_announce, &client_sk, addr());

        let inner = InnerOnionDataRequest {
            destination_pk: client_sk.public_key(),
            nonce: [42; NONCEBYTES],
            temporary_pk: SecretKey::generate(&mut thread_rng()).public_key(),
            payload: vec![42; 123],
        };
        let request = OnionDataRequest {
            inner: inner.clone(),
            onion_return: OnionReturn {
                nonce: [24; NONCEBYTES],
                payload: vec![24; ONION_RETURN_3_PAYLOAD_SIZE],
            },
        };

        let (response, saddr) = onion_announce.handle_data_request(request).unwrap();

        assert_eq!(saddr, addr());
        assert_eq!(response.onion_return, onion_return());
        assert_eq!(response.payload, InnerOnionResponse::OnionDataResponse(OnionDataResponse {
            nonce: inner.nonce,
            temporary_pk: inner.temporary_pk,
            payload: inner.payload,
        }));
    }

    #[tokio::test]
    async fn handle_data_request_to_unknown_node() {
        tokio::time::pause();
        let (onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let destination_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let request = OnionDataRequest {
            inner: InnerOnionDataRequest {
                destination_pk: destination_pk.clone(),
                nonce: [42; NONCEBYTES],
                temporary_pk: SecretKey::generate(&mut thread_rng()).public_key(),
                payload: vec![42; 123],
            },
            onion_return: onion_return(),
        };

        let error = onion_announce.handle_data_request(request).unwrap_err();
        assert!(matches!(error, HandleRequestError::NoAnnouncedNode { pk } if pk == destination_pk));
    }

    #[tokio::test]
    async fn handle_packet_drops_malformed_packets() {
        tokio::time::pause();
        let (mut onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let mut rng = thread_rng();

        assert!(onion_announce.handle_packet(&mut rng, &[], addr()).is_none());
        assert!(onion_announce.handle_packet(&mut rng, &[0x83; LEGACY_ANNOUNCE_REQUEST_SIZE - 1], addr()).is_none());
        assert!(onion_announce.handle_packet(&mut rng, &[0x87; 600], addr()).is_none());
        assert!(onion_announce.handle_packet(&mut rng, &[0x85; 100], addr()).is_none());
        assert!(onion_announce.handle_packet(&mut rng, &[0x42; 400], addr()).is_none());
        // right size but garbage inside
        assert!(onion_announce.handle_packet(&mut rng, &[0x83; LEGACY_ANNOUNCE_REQUEST_SIZE], addr()).is_none());
    }

    #[tokio::test]
    async fn dispatch_errors() {
        tokio::time::pause();
        let (mut onion_announce, _) = onion_announce(&AnnounceConfig::default());
        let mut rng = thread_rng();

        assert!(matches!(
            onion_announce.dispatch_packet(&mut rng, &[0x42; 400], addr()),
            Err(HandleRequestError::UnknownKind { kind: 0x42 })
        ));
        assert!(matches!(
            onion_announce.dispatch_packet(&mut rng, &[0x83; 100], addr()),
            Err(HandleRequestError::InvalidSize { len: 100 })
        ));
        assert!(matches!(
            onion_announce.dispatch_packet(&mut rng, &[0x83; LEGACY_ANNOUNCE_REQUEST_SIZE], addr()),
            Err(HandleRequestError::GetPayload(_))
        ));
    }
}
