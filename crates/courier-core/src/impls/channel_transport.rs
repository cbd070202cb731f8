//! ChannelTransport - Link の上に載せた Transport 実装
//!
//! 1 本の Link を `request` / `response` / `event` の 3 レーンに分け、
//! 要求と応答はシーケンス番号で対応付けます。
//!
//! # 状態
//! - **pending**: こちらが送った要求。応答のシーケンス番号で引く
//! - **serving**: 相手の要求に答えている respondent のハンドル
//! - **respondents**: シグネチャ → respondent
//! - **subjects**: イベントのシグネチャ → broadcast
//!
//! # キャンセル
//! pending の要求を abort すると、同じシーケンス番号の `Aborted` パッケージを
//! request レーンで送ります（`abort_remote_on_cancel`）。相手は serving の
//! ハンドルを abort し、そのキャンセルが `Aborted` の応答として返ってきて
//! 要求側のハンドルが Cancelled になります。
//!
//! ロックは状態の読み書きの間だけ取り、TaskHandle の遷移はロックの外で行います。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::memory_link::MemoryLink;
use crate::config::TransportConfig;
use crate::domain::{PackageError, TransportError};
use crate::ports::{Link, Transport};
use crate::protocol::{Channel, Code, Frame, Package, Payload};
use crate::task::{Settlement, TaskHandle};
use crate::typed::{DynRespondent, RespondentRegistry, Subscription};

#[derive(Default)]
struct TransportState {
    pending: HashMap<u64, TaskHandle<Package>>,
    serving: HashMap<u64, TaskHandle<Payload>>,
    respondents: RespondentRegistry,
    subjects: HashMap<String, broadcast::Sender<Value>>,
    destroyed: bool,
    disconnected: bool,
}

struct TransportShared {
    link: Arc<dyn Link>,
    config: TransportConfig,
    sequence: AtomicU64,
    state: Mutex<TransportState>,
}

pub struct ChannelTransport {
    shared: Arc<TransportShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelTransport {
    /// Attach to `link` and start reading from it. Must be called within a Tokio runtime.
    pub fn new(link: Arc<dyn Link>, config: TransportConfig) -> Self {
        let shared = Arc::new(TransportShared {
            link: Arc::clone(&link),
            config,
            sequence: AtomicU64::new(0),
            state: Mutex::new(TransportState::default()),
        });
        let reader = tokio::spawn(read_loop(link, Arc::downgrade(&shared)));
        Self {
            shared,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Two transports connected through a `MemoryLink`.
    pub fn in_memory_pair(config: TransportConfig) -> (Self, Self) {
        let (left, right) = MemoryLink::pair();
        (
            Self::new(Arc::new(left), config.clone()),
            Self::new(Arc::new(right), config),
        )
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn serving_requests(&self) -> usize {
        self.shared.lock().serving.len()
    }

    pub fn is_connected(&self) -> bool {
        let state = self.shared.lock();
        !state.destroyed && !state.disconnected
    }

    /// Feed `payload` into this transport as if the peer had sent it.
    pub fn emulate(&self, payload: Payload) -> Emulation<'_> {
        Emulation {
            shared: &self.shared,
            payload,
        }
    }

    pub fn subscribed_signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self.shared.lock().subjects.keys().cloned().collect();
        signatures.sort();
        signatures
    }

    fn stop_reader(&self) {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Transport for ChannelTransport {
    fn request_payload(&self, payload: Payload) -> TaskHandle<Package> {
        let handle: TaskHandle<Package> = TaskHandle::new();
        let signature = payload.signature().to_string();
        let sequence = {
            let mut state = self.shared.lock();
            if let Some(err) = state.closed_error() {
                drop(state);
                handle.reject(err.into());
                return handle;
            }
            let sequence = self.shared.next_sequence(&state);
            state.pending.insert(sequence, handle.clone());
            sequence
        };

        let shared = Arc::downgrade(&self.shared);
        handle.finally(move || {
            if let Some(shared) = shared.upgrade() {
                shared.lock().pending.remove(&sequence);
            }
        });
        if self.shared.config.abort_remote_on_cancel {
            let shared = Arc::downgrade(&self.shared);
            let target = handle.clone();
            let delegated = handle.delegate(move |_| match shared.upgrade() {
                Some(shared) => shared.abort_remote(sequence, &target),
                None => target.cancel(None),
            });
            if let Err(err) = delegated {
                tracing::error!(seq = sequence, error = %err, "failed to wire remote abort");
            }
        }

        let package = Package::new(sequence).with_payload(payload);
        match self.shared.send(Channel::Request, &package) {
            Ok(()) => tracing::debug!(seq = sequence, signature = %signature, "request sent"),
            Err(err) => {
                handle.try_to_stop_cancellation();
                handle.reject(err.into());
            }
        }
        handle
    }

    fn register_respondent(
        &self,
        owner: &str,
        respondent: Arc<dyn DynRespondent>,
    ) -> Result<Subscription, TransportError> {
        let signature = respondent.signature().to_string();
        {
            let mut state = self.shared.lock();
            if state.destroyed {
                return Err(TransportError::Destroyed);
            }
            state.respondents.register(owner, respondent)?;
        }
        tracing::debug!(owner, signature = %signature, "respondent registered");

        let shared = Arc::downgrade(&self.shared);
        let owner = owner.to_string();
        let id = format!("{owner}:{signature}");
        Ok(Subscription::new(id, move || {
            if let Some(shared) = shared.upgrade() {
                shared.lock().respondents.remove(&owner, &signature);
            }
        }))
    }

    fn notify_payload(&self, payload: Payload) -> Result<(), TransportError> {
        if let Some(err) = self.shared.lock().closed_error() {
            return Err(err);
        }
        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        self.shared
            .send(Channel::Event, &Package::new(sequence).with_payload(payload))
    }

    fn subscribe_signature(
        &self,
        signature: &str,
    ) -> Result<broadcast::Receiver<Value>, TransportError> {
        if signature.trim().is_empty() {
            return Err(TransportError::InvalidEventName);
        }
        let mut state = self.shared.lock();
        if state.destroyed {
            return Err(TransportError::Destroyed);
        }
        let capacity = self.shared.config.event_capacity.max(1);
        Ok(state
            .subjects
            .entry(signature.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe())
    }

    fn destroy(&self) {
        let (pending, serving) = {
            let mut state = self.shared.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.respondents.clear();
            state.subjects.clear();
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.serving),
            )
        };
        tracing::debug!(
            pending = pending.len(),
            serving = serving.len(),
            "destroying transport"
        );
        for (_, handle) in pending {
            handle.try_to_stop_cancellation();
            handle.reject(TransportError::Destroyed.into());
        }
        for (_, handle) in serving {
            handle.abort(None);
        }
        self.shared.link.close();
        self.stop_reader();
    }
}

/// Locally injected frame, see `ChannelTransport::emulate`.
pub struct Emulation<'a> {
    shared: &'a Arc<TransportShared>,
    payload: Payload,
}

impl Emulation<'_> {
    /// Deliver as an incoming event to the local subscribers.
    pub fn event(self) {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        self.inject(Channel::Event, Package::new(sequence).with_payload(self.payload.clone()));
    }

    /// Deliver as an incoming request. The local respondent's reply goes to the peer
    /// under the returned sequence number.
    pub fn request(self) -> u64 {
        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        self.inject(Channel::Request, Package::new(sequence).with_payload(self.payload.clone()));
        sequence
    }

    /// Deliver as the `Done` reply to the local pending request `sequence`.
    pub fn response(self, sequence: u64) {
        self.inject(Channel::Response, Package::new(sequence).with_payload(self.payload.clone()));
    }

    fn inject(&self, channel: Channel, package: Package) {
        if let Some(err) = self.shared.lock().closed_error() {
            tracing::warn!(?channel, seq = package.sequence(), error = %err, "emulated frame dropped");
            return;
        }
        tracing::debug!(?channel, seq = package.sequence(), signature = self.payload.signature(), "emulating frame");
        self.shared.dispatch(Frame::new(channel, &package));
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn read_loop(link: Arc<dyn Link>, shared: Weak<TransportShared>) {
    while let Some(frame) = link.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.dispatch(frame);
    }
    if let Some(shared) = shared.upgrade() {
        shared.disconnect();
    }
}

impl TransportState {
    fn closed_error(&self) -> Option<TransportError> {
        if self.destroyed {
            Some(TransportError::Destroyed)
        } else if self.disconnected {
            Some(TransportError::Disconnected)
        } else {
            None
        }
    }
}

impl TransportShared {
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next sequence number not used by a pending request.
    fn next_sequence(&self, state: &TransportState) -> u64 {
        loop {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            if !state.pending.contains_key(&sequence) {
                return sequence;
            }
        }
    }

    fn send(&self, channel: Channel, package: &Package) -> Result<(), TransportError> {
        self.link.send(Frame::new(channel, package)).inspect_err(|err| {
            tracing::warn!(seq = package.sequence(), ?channel, error = %err, "failed to send frame");
        })
    }

    fn abort_remote(&self, sequence: u64, handle: &TaskHandle<Package>) {
        let closed = self.lock().closed_error();
        let sent = match closed {
            Some(err) => Err(err),
            None => self.send(Channel::Request, &Package::aborting(sequence)),
        };
        match sent {
            Ok(()) => tracing::debug!(seq = sequence, "abort forwarded to respondent"),
            Err(_) => handle.cancel(None),
        }
    }

    fn dispatch(self: &Arc<Self>, frame: Frame) {
        let packed = match frame.parse_body() {
            Ok(packed) => packed,
            Err(err) => {
                tracing::error!(channel = ?frame.channel, error = %err, "dropping malformed frame");
                return;
            }
        };
        match frame.channel {
            Channel::Response => self.on_response(&packed),
            Channel::Request => self.on_request(&packed),
            Channel::Event => self.on_event(&packed),
        }
    }

    fn on_response(&self, packed: &Value) {
        let package = match Package::from_packed(packed) {
            Ok(package) => package,
            Err(err) => {
                tracing::error!(error = %err, "malformed response");
                if let Some(sequence) = Package::peek_sequence(packed) {
                    let handle = self.lock().pending.remove(&sequence);
                    if let Some(handle) = handle {
                        handle.try_to_stop_cancellation();
                        handle.reject(err.into());
                    }
                }
                return;
            }
        };
        let sequence = package.sequence();
        let handle = self.lock().pending.remove(&sequence);
        let Some(handle) = handle else {
            tracing::warn!(
                seq = sequence,
                signature = package.signature().unwrap_or("unknown"),
                "response without pending request"
            );
            return;
        };

        match package.code() {
            Code::Aborted => {
                tracing::debug!(seq = sequence, "request aborted by respondent");
                handle.cancel(None);
            }
            Code::Error => {
                let err = package
                    .remote_error()
                    .unwrap_or_else(|| PackageError::MissingErrorMessage.into());
                handle.try_to_stop_cancellation();
                handle.reject(err);
            }
            Code::Done if package.payload().is_some() => {
                handle.try_to_stop_cancellation();
                handle.resolve(package);
            }
            Code::Done | Code::Unknown => {
                handle.try_to_stop_cancellation();
                handle.reject(PackageError::NoPayload.into());
            }
        }
    }

    fn on_request(self: &Arc<Self>, packed: &Value) {
        let package = match Package::from_packed(packed) {
            Ok(package) => package,
            Err(err) => {
                tracing::error!(error = %err, "malformed request");
                if let Some(sequence) = Package::peek_sequence(packed) {
                    let _ = self.send(Channel::Response, &error_reply(sequence, err.to_string()));
                }
                return;
            }
        };
        let sequence = package.sequence();

        if package.is_aborted() {
            let serving = self.lock().serving.get(&sequence).cloned();
            match serving {
                Some(serving) => {
                    tracing::debug!(seq = sequence, "requester aborted; aborting respondent");
                    serving.abort(None);
                }
                None => tracing::debug!(seq = sequence, "abort for a request no longer served"),
            }
            return;
        }

        let Some(payload) = package.into_payload() else {
            let _ = self.send(
                Channel::Response,
                &error_reply(sequence, PackageError::NoPayload.to_string()),
            );
            return;
        };
        let respondent = self.lock().respondents.get(payload.signature());
        let Some(respondent) = respondent else {
            let err = TransportError::NoRespondent(payload.signature().to_string());
            tracing::warn!(seq = sequence, signature = payload.signature(), "no respondent");
            let _ = self.send(Channel::Response, &error_reply(sequence, err.to_string()));
            return;
        };

        tracing::debug!(seq = sequence, signature = payload.signature(), "serving request");
        let serving = respondent.respond_dyn(&payload);
        self.lock().serving.insert(sequence, serving.clone());
        let link = Arc::clone(&self.link);
        let shared = Arc::downgrade(self);
        serving.when_settled(move |settled| {
            if let Some(shared) = shared.upgrade() {
                shared.lock().serving.remove(&sequence);
            }
            let reply = match settled {
                Settlement::Resolved(payload) => Package::new(sequence).with_payload(payload),
                Settlement::Rejected(err) => error_reply(sequence, err.to_wire_string()),
                Settlement::Cancelled(_) => Package::aborting(sequence),
            };
            if let Err(err) = link.send(Frame::new(Channel::Response, &reply)) {
                tracing::warn!(seq = sequence, error = %err, "failed to send reply");
            }
        });
    }

    fn on_event(&self, packed: &Value) {
        let package = match Package::from_packed(packed) {
            Ok(package) => package,
            Err(err) => {
                tracing::error!(error = %err, "malformed event");
                return;
            }
        };
        let Some(payload) = package.into_payload() else {
            tracing::error!("event without payload");
            return;
        };
        let signature = payload.signature();
        let subject = self.lock().subjects.get(signature).cloned();
        match subject {
            Some(subject) => {
                if subject.send(payload.body().clone()).is_err() {
                    tracing::debug!(signature, "event has no live subscribers");
                    let mut state = self.lock();
                    if let Some(current) = state.subjects.get(signature)
                        && current.receiver_count() == 0
                    {
                        state.subjects.remove(signature);
                    }
                }
            }
            None => tracing::warn!(signature, "event without subscribers"),
        }
    }

    fn disconnect(&self) {
        let (pending, serving) = {
            let mut state = self.lock();
            if state.destroyed || state.disconnected {
                return;
            }
            state.disconnected = true;
            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.serving),
            )
        };
        tracing::warn!(pending = pending.len(), "link closed; rejecting pending requests");
        for (_, handle) in pending {
            handle.try_to_stop_cancellation();
            handle.reject(TransportError::Disconnected.into());
        }
        for (_, handle) in serving {
            handle.abort(None);
        }
    }
}

/// `Error` reply for `sequence`. An empty message is replaced.
fn error_reply(sequence: u64, message: String) -> Package {
    let message = if message.is_empty() {
        "respondent failed".to_string()
    } else {
        message
    };
    Package::new(sequence)
        .with_error(message)
        .unwrap_or_else(|_| Package::aborting(sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::TaskError;

    fn transport_with_raw_peer(config: TransportConfig) -> (ChannelTransport, MemoryLink) {
        let (left, right) = MemoryLink::pair();
        (ChannelTransport::new(Arc::new(left), config), right)
    }

    fn ping() -> Payload {
        Payload::new("Ping", json!({ "n": 1 })).unwrap()
    }

    async fn next_package(peer: &MemoryLink) -> (Channel, Package) {
        let frame = peer.recv().await.unwrap();
        let package = Package::from_packed(&frame.parse_body().unwrap()).unwrap();
        (frame.channel, package)
    }

    #[tokio::test]
    async fn done_reply_resolves_the_pending_request() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        assert_eq!(transport.pending_requests(), 1);

        let (channel, request) = next_package(&peer).await;
        assert_eq!(channel, Channel::Request);
        assert_eq!(request.signature(), Ok("Ping"));

        let reply = Package::new(request.sequence())
            .with_payload(Payload::new("Pong", json!({ "n": 2 })).unwrap());
        peer.send(Frame::new(Channel::Response, &reply)).unwrap();

        assert_eq!(handle.wait().await, Settlement::Resolved(reply));
        assert_eq!(transport.pending_requests(), 0);
    }

    #[tokio::test]
    async fn sequence_numbers_are_distinct_per_request() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let _first = transport.request_payload(ping());
        let _second = transport.request_payload(ping());

        let (_, first) = next_package(&peer).await;
        let (_, second) = next_package(&peer).await;
        assert_ne!(first.sequence(), second.sequence());
    }

    #[tokio::test]
    async fn malformed_response_rejects_the_matching_request() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        let (_, request) = next_package(&peer).await;

        let body = json!({ "seq": request.sequence(), "code": 0, "payload": "nope" });
        peer.send(Frame {
            channel: Channel::Response,
            body: body.to_string(),
        })
        .unwrap();

        assert_eq!(
            handle.wait().await,
            Settlement::Rejected(TaskError::Protocol(PackageError::PayloadNotObject))
        );
    }

    #[tokio::test]
    async fn error_reply_rejects_with_the_remote_message() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        let (_, request) = next_package(&peer).await;

        peer.send(Frame::new(
            Channel::Response,
            &Package::new(request.sequence()).with_error("boom").unwrap(),
        ))
        .unwrap();

        assert_eq!(
            handle.wait().await,
            Settlement::Rejected(TaskError::Remote("boom".to_string()))
        );
    }

    #[tokio::test]
    async fn abort_is_forwarded_and_completed_by_the_aborted_reply() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        let (_, request) = next_package(&peer).await;

        handle.abort(None);
        assert!(handle.is_canceling());

        let (channel, abort) = next_package(&peer).await;
        assert_eq!(channel, Channel::Request);
        assert_eq!(abort, Package::aborting(request.sequence()));

        peer.send(Frame::new(
            Channel::Response,
            &Package::aborting(request.sequence()),
        ))
        .unwrap();
        assert_eq!(handle.wait().await, Settlement::Cancelled(None));
    }

    #[tokio::test]
    async fn abort_without_remote_forwarding_cancels_locally() {
        let config = TransportConfig {
            abort_remote_on_cancel: false,
            ..TransportConfig::default()
        };
        let (transport, _peer) = transport_with_raw_peer(config);
        let handle = transport.request_payload(ping());

        handle.abort(None);
        assert_eq!(handle.settlement(), Some(Settlement::Cancelled(None)));
        assert_eq!(transport.pending_requests(), 0);
    }

    #[tokio::test]
    async fn unknown_signature_is_answered_with_an_error() {
        let (_transport, peer) = transport_with_raw_peer(TransportConfig::default());
        peer.send(Frame::new(
            Channel::Request,
            &Package::new(7).with_payload(ping()),
        ))
        .unwrap();

        let (channel, reply) = next_package(&peer).await;
        assert_eq!(channel, Channel::Response);
        assert_eq!(reply.sequence(), 7);
        assert_eq!(reply.code(), Code::Error);
        assert_eq!(
            reply.error(),
            Some(TransportError::NoRespondent("Ping".to_string()).to_string().as_str())
        );
    }

    #[tokio::test]
    async fn closed_link_rejects_pending_and_later_requests() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        let _ = next_package(&peer).await;

        peer.close();
        assert_eq!(
            handle.wait().await,
            Settlement::Rejected(TaskError::Transport(TransportError::Disconnected))
        );
        assert!(!transport.is_connected());

        let late = transport.request_payload(ping());
        assert_eq!(
            late.settlement(),
            Some(Settlement::Rejected(TaskError::Transport(
                TransportError::Disconnected
            )))
        );
    }

    #[tokio::test]
    async fn destroy_rejects_pending_and_refuses_new_work() {
        let (transport, _peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());

        transport.destroy();
        assert_eq!(
            handle.settlement(),
            Some(Settlement::Rejected(TaskError::Transport(
                TransportError::Destroyed
            )))
        );
        assert_eq!(
            transport.subscribe_signature("Tick").err(),
            Some(TransportError::Destroyed)
        );
        assert_eq!(
            transport.notify_payload(ping()),
            Err(TransportError::Destroyed)
        );
    }

    #[tokio::test]
    async fn blank_event_names_are_refused() {
        let (transport, _peer) = transport_with_raw_peer(TransportConfig::default());
        assert_eq!(
            transport.subscribe_signature("  ").err(),
            Some(TransportError::InvalidEventName)
        );
    }

    #[tokio::test]
    async fn events_reach_subscribers_of_their_signature() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let mut ticks = transport.subscribe_signature("Tick").unwrap();
        let mut other = transport.subscribe_signature("Tock").unwrap();

        let tick = Payload::new("Tick", json!({ "n": 3 })).unwrap();
        peer.send(Frame::new(Channel::Event, &Package::new(0).with_payload(tick)))
            .unwrap();

        assert_eq!(ticks.recv().await.unwrap(), json!({ "n": 3 }));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_the_transport_rejects_pending_requests() {
        let (transport, _peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());

        drop(transport);
        assert_eq!(
            handle.settlement(),
            Some(Settlement::Rejected(TaskError::Transport(
                TransportError::Destroyed
            )))
        );
    }

    #[tokio::test]
    async fn subjects_without_receivers_are_pruned() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let ticks = transport.subscribe_signature("Tick").unwrap();
        let mut tocks = transport.subscribe_signature("Tock").unwrap();
        assert_eq!(transport.subscribed_signatures(), vec!["Tick", "Tock"]);
        drop(ticks);

        let tick = Payload::new("Tick", json!({ "n": 1 })).unwrap();
        let tock = Payload::new("Tock", json!({ "n": 2 })).unwrap();
        peer.send(Frame::new(Channel::Event, &Package::new(0).with_payload(tick)))
            .unwrap();
        peer.send(Frame::new(Channel::Event, &Package::new(1).with_payload(tock)))
            .unwrap();

        assert_eq!(tocks.recv().await.unwrap(), json!({ "n": 2 }));
        assert_eq!(transport.subscribed_signatures(), vec!["Tock"]);
    }

    #[tokio::test]
    async fn emulated_event_reaches_local_subscribers() {
        let (transport, _peer) = transport_with_raw_peer(TransportConfig::default());
        let mut ticks = transport.subscribe_signature("Tick").unwrap();

        transport
            .emulate(Payload::new("Tick", json!({ "n": 5 })).unwrap())
            .event();

        assert_eq!(ticks.try_recv().unwrap(), json!({ "n": 5 }));
    }

    #[tokio::test]
    async fn emulated_response_settles_the_pending_request() {
        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        let handle = transport.request_payload(ping());
        let (_, request) = next_package(&peer).await;

        let pong = Payload::new("Pong", json!({ "n": 2 })).unwrap();
        transport.emulate(pong.clone()).response(request.sequence());

        assert_eq!(
            handle.settlement(),
            Some(Settlement::Resolved(
                Package::new(request.sequence()).with_payload(pong)
            ))
        );
    }

    #[tokio::test]
    async fn emulated_request_is_answered_to_the_peer() {
        use crate::typed::{Message, TransportExt};
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Ping {
            n: u32,
        }

        impl Message for Ping {
            const SIGNATURE: &'static str = "Ping";
        }

        let (transport, peer) = transport_with_raw_peer(TransportConfig::default());
        transport
            .respondent::<Ping, Ping, _>("echo", |ping| TaskHandle::resolved(Ping { n: ping.n * 10 }))
            .unwrap();

        let sequence = transport.emulate(ping()).request();

        let (channel, reply) = next_package(&peer).await;
        assert_eq!(channel, Channel::Response);
        assert_eq!(reply.sequence(), sequence);
        assert_eq!(reply.decode::<Ping>(), Ok(Ping { n: 10 }));
    }

    #[tokio::test]
    async fn emulation_after_destroy_is_dropped() {
        let (transport, _peer) = transport_with_raw_peer(TransportConfig::default());
        transport.destroy();
        transport.emulate(ping()).event();
        assert!(transport.subscribed_signatures().is_empty());
    }
}
