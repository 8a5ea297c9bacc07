/*! Receiver of onion data packets delivered through announce nodes.

Announced node gets `OnionDataResponse` packets from the announce node it's
announced on. Such packets contain data encrypted twice: with data
`PublicKey` the node was announced with and with the real (long term)
`PublicKey` of the node.
*/

use std::collections::HashMap;

use futures::channel::mpsc;

use tox_crypto::*;
use tox_packet::onion::*;
use crate::onion::errors::*;

/// Channel for friend requests together with the real `PublicKey` of sender.
pub type FriendRequestTx = mpsc::UnboundedSender<(PublicKey, FriendRequest)>;

/// Channel for data packets of a specific kind together with the real
/// `PublicKey` of sender.
pub type DataTx = mpsc::UnboundedSender<(PublicKey, Vec<u8>)>;

/// Send packet to the sink if it's set.
fn maybe_send_unbounded<T>(tx: Option<&mpsc::UnboundedSender<T>>, value: T) -> Result<(), mpsc::SendError> {
    if let Some(tx) = tx {
        tx.unbounded_send(value).map_err(|e| e.into_send_error())
    } else {
        Ok(())
    }
}

/// Opens `OnionDataResponse` packets and dispatches their content to sinks.
pub struct OnionDataReceiver {
    /// `SecretKey` for the data `PublicKey` we are announced with
    data_sk: SecretKey,
    /// Our long term `SecretKey`
    real_sk: SecretKey,
    /// Sink for friend requests
    friend_request_tx: Option<FriendRequestTx>,
    /// Sinks for other packets by their kind byte
    data_tx: HashMap<u8, DataTx>,
}

impl OnionDataReceiver {
    /// Create new `OnionDataReceiver` without sinks.
    pub fn new(data_sk: SecretKey, real_sk: SecretKey) -> OnionDataReceiver {
        OnionDataReceiver {
            data_sk,
            real_sk,
            friend_request_tx: None,
            data_tx: HashMap::new(),
        }
    }

    /// Set sink to send friend requests.
    pub fn set_friend_request_sink(&mut self, friend_request_sink: FriendRequestTx) {
        self.friend_request_tx = Some(friend_request_sink);
    }

    /// Set sink to send packets with the given kind byte.
    pub fn set_data_sink(&mut self, kind: u8, data_sink: DataTx) {
        self.data_tx.insert(kind, data_sink);
    }

    /// Handle `OnionDataResponse` packet.
    pub fn handle_data_response(&self, packet: &OnionDataResponse) -> Result<(), HandleDataResponseError> {
        let payload = packet.get_payload(&precompute(&packet.temporary_pk, &self.data_sk))
            .map_err(HandleDataResponseError::InvalidPayload)?;
        let inner_payload = payload.get_payload(&packet.nonce, &precompute(&payload.real_pk, &self.real_sk))
            .map_err(HandleDataResponseError::InvalidInnerPayload)?;
        match inner_payload {
            OnionDataResponseInnerPayload::FriendRequest(friend_request) =>
                maybe_send_unbounded(self.friend_request_tx.as_ref(), (payload.real_pk, friend_request))
                    .map_err(HandleDataResponseError::FriendRequest),
            OnionDataResponseInnerPayload::Other { kind, data } => match self.data_tx.get(&kind) {
                Some(tx) => maybe_send_unbounded(Some(tx), (payload.real_pk, data))
                    .map_err(HandleDataResponseError::Data),
                None => {
                    trace!("No sink for onion data packet of kind 0x{:02x}", kind);
                    Ok(())
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;
    use rand::thread_rng;

    struct Sender {
        real_sk: SecretKey,
    }

    impl Sender {
        // build the packet as the announce node would forward it
        fn packet(&self, receiver_data_pk: &PublicKey, receiver_real_pk: &PublicKey, inner: &OnionDataResponseInnerPayload) -> OnionDataResponse {
            let mut rng = thread_rng();
            let nonce = gen_nonce(&mut rng);
            let temporary_sk = SecretKey::generate(&mut rng);
            let payload = OnionDataResponsePayload::new(
                &precompute(receiver_real_pk, &self.real_sk),
                self.real_sk.public_key(),
                &nonce,
                inner,
            ).unwrap();
            let request = InnerOnionDataRequest::new(
                &precompute(receiver_data_pk, &temporary_sk),
                receiver_real_pk.clone(),
                temporary_sk.public_key(),
                nonce,
                &payload,
            ).unwrap();
            request.into()
        }
    }

    fn receiver() -> (OnionDataReceiver, PublicKey, PublicKey) {
        let mut rng = thread_rng();
        let data_sk = SecretKey::generate(&mut rng);
        let real_sk = SecretKey::generate(&mut rng);
        let data_pk = data_sk.public_key();
        let real_pk = real_sk.public_key();
        (OnionDataReceiver::new(data_sk, real_sk), data_pk, real_pk)
    }

    #[tokio::test]
    async fn handle_friend_request() {
        let (mut receiver, data_pk, real_pk) = receiver();
        let (tx, mut rx) = mpsc::unbounded();
        receiver.set_friend_request_sink(tx);

        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let friend_request = FriendRequest::new([42; NOSPAMBYTES], "hello".to_owned());
        let packet = sender.packet(&data_pk, &real_pk, &OnionDataResponseInnerPayload::FriendRequest(friend_request.clone()));

        receiver.handle_data_response(&packet).unwrap();

        let (sender_pk, received) = rx.next().await.unwrap();
        assert_eq!(sender_pk, sender.real_sk.public_key());
        assert_eq!(received, friend_request);
    }

    #[tokio::test]
    async fn handle_data_with_registered_kind() {
        let (mut receiver, data_pk, real_pk) = receiver();
        let (tx, mut rx) = mpsc::unbounded();
        receiver.set_data_sink(0x9c, tx);

        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let inner = OnionDataResponseInnerPayload::Other { kind: 0x9c, data: vec![1, 2, 3] };
        let packet = sender.packet(&data_pk, &real_pk, &inner);

        receiver.handle_data_response(&packet).unwrap();

        let (sender_pk, data) = rx.next().await.unwrap();
        assert_eq!(sender_pk, sender.real_sk.public_key());
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn handle_data_with_unregistered_kind() {
        let (receiver, data_pk, real_pk) = receiver();
        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let inner = OnionDataResponseInnerPayload::Other { kind: 0x9d, data: vec![1, 2, 3] };
        let packet = sender.packet(&data_pk, &real_pk, &inner);

        assert!(receiver.handle_data_response(&packet).is_ok());
    }

    #[test]
    fn handle_data_for_other_data_pk() {
        let (receiver, _data_pk, real_pk) = receiver();
        let other_data_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let friend_request = FriendRequest::new([42; NOSPAMBYTES], "hello".to_owned());
        let packet = sender.packet(&other_data_pk, &real_pk, &OnionDataResponseInnerPayload::FriendRequest(friend_request));

        assert!(matches!(
            receiver.handle_data_response(&packet),
            Err(HandleDataResponseError::InvalidPayload(_))
        ));
    }

    #[test]
    fn handle_data_for_other_real_pk() {
        let (receiver, data_pk, _real_pk) = receiver();
        let other_real_pk = SecretKey::generate(&mut thread_rng()).public_key();
        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let friend_request = FriendRequest::new([42; NOSPAMBYTES], "hello".to_owned());
        let packet = sender.packet(&data_pk, &other_real_pk, &OnionDataResponseInnerPayload::FriendRequest(friend_request));

        assert!(matches!(
            receiver.handle_data_response(&packet),
            Err(HandleDataResponseError::InvalidInnerPayload(_))
        ));
    }

    #[test]
    fn handle_friend_request_with_closed_sink() {
        let (mut receiver, data_pk, real_pk) = receiver();
        let (tx, rx) = mpsc::unbounded();
        receiver.set_friend_request_sink(tx);
        drop(rx);

        let sender = Sender { real_sk: SecretKey::generate(&mut thread_rng()) };
        let friend_request = FriendRequest::new([42; NOSPAMBYTES], "hello".to_owned());
        let packet = sender.packet(&data_pk, &real_pk, &OnionDataResponseInnerPayload::FriendRequest(friend_request));

        assert!(matches!(
            receiver.handle_data_response(&packet),
            Err(HandleDataResponseError::FriendRequest(_))
        ));
    }
}
