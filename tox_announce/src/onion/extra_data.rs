/*! Extra data that can be appended to extended announce responses.

Higher layers (e.g. group chats) can register a producer that writes some
data after the list of nodes in `OnionAnnounceResponsePayload`. This data is
best effort: if producer fails or writes too much the response is sent
without it.
*/

use thiserror::Error;

use tox_crypto::*;
use tox_packet::onion::*;

/// Maximum size of extra data that a producer can declare. It's the space
/// left in the largest extended response with zero nodes.
pub const MAX_EXTRA_DATA_PRODUCER_SIZE: usize =
    ONION_ANNOUNCE_RESPONSE_MAX_SIZE - ONION_ANNOUNCE_RESPONSE_OVERHEAD - (1 + PING_ID_SIZE + 1); // 543

/// Context of the announce request for which extra data is produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExtraDataRequest<'a> {
    /// `PublicKey` of the node that sent announce request
    pub requester_pk: &'a PublicKey,
    /// `PublicKey` the requester is looking for
    pub search_pk: &'a PublicKey,
    /// Number of nodes in the response
    pub nodes_count: usize,
    /// Extra data from the announce request
    pub request_data: &'a [u8],
}

/// Error that can be returned by `ExtraDataProducer`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ExtraDataError {
    /// Producer has nothing to add for this request.
    #[error("No extra data for request")]
    NoData,
    /// Producer failed with custom message.
    #[error("Extra data producer error: {0}")]
    Other(String),
}

/// Producer of extra data for extended announce responses.
pub trait ExtraDataProducer: Send {
    /// Write extra data to `out` and return the number of written bytes.
    fn produce(&mut self, request: &ExtraDataRequest, out: &mut [u8]) -> Result<usize, ExtraDataError>;
}

/// Registered producer together with its declared maximum size.
pub(crate) struct ExtraDataHook {
    max_size: usize,
    producer: Box<dyn ExtraDataProducer>,
}

impl ExtraDataHook {
    pub(crate) fn new<P: ExtraDataProducer + 'static>(max_size: usize, producer: P) -> ExtraDataHook {
        ExtraDataHook {
            max_size: max_size.min(MAX_EXTRA_DATA_PRODUCER_SIZE),
            producer: Box::new(producer),
        }
    }

    /// Run producer if `budget` can hold the declared maximum size. Returns
    /// empty data when producer is not run or fails.
    pub(crate) fn produce(&mut self, request: &ExtraDataRequest, budget: usize) -> Vec<u8> {
        if budget < self.max_size {
            trace!("Not enough space for extra data: {} < {}", budget, self.max_size);
            return Vec::new();
        }

        let mut buf = vec![0; self.max_size];
        match self.producer.produce(request, &mut buf) {
            Ok(size) if size <= buf.len() => {
                buf.truncate(size);
                buf
            },
            Ok(size) => {
                debug!("Extra data producer reported {} bytes for {} bytes buffer", size, buf.len());
                Vec::new()
            },
            Err(e) => {
                debug!("Extra data producer failed: {}", e);
                Vec::new()
            },
        }
    }
}
