use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;

use courier_core::config::TransportConfig;
use courier_core::domain::{NativeError, TaskError, TransportError};
use courier_core::impls::{ChannelTransport, MemoryLink};
use courier_core::ports::{Link, Transport};
use courier_core::protocol::{Channel, Code, Frame, Package, Payload};
use courier_core::task::{Settlement, TaskHandle};
use courier_core::typed::{Message, TransportExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    n: u32,
}

impl Message for Ping {
    const SIGNATURE: &'static str = "Ping";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Pong {
    n: u32,
}

impl Message for Pong {
    const SIGNATURE: &'static str = "Pong";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tick {
    at: u64,
}

impl Message for Tick {
    const SIGNATURE: &'static str = "Tick";
}

fn pair() -> (ChannelTransport, ChannelTransport) {
    ChannelTransport::in_memory_pair(TransportConfig::default())
}

async fn settle_spawned() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn typed_request_is_answered() {
    let (client, server) = pair();
    server
        .respondent::<Ping, Pong, _>("math", |ping| TaskHandle::resolved(Pong { n: ping.n + 1 }))
        .unwrap();

    let reply = client.request::<Ping, Pong>(&Ping { n: 41 }).await;
    assert_eq!(reply, Settlement::Resolved(Pong { n: 42 }));
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(server.serving_requests(), 0);
}

#[tokio::test]
async fn respondent_failure_rejects_the_requester() {
    let (client, server) = pair();
    server
        .respondent::<Ping, Pong, _>("math", |_| TaskHandle::rejected(TaskError::other("boom")))
        .unwrap();

    let reply = client.request::<Ping, Pong>(&Ping { n: 1 }).await;
    assert_eq!(reply, Settlement::Rejected(TaskError::Remote("boom".to_string())));
}

#[tokio::test]
async fn native_errors_keep_their_structure() {
    let (client, server) = pair();
    let native = NativeError::new("ENOENT", "no such file", "error");
    let thrown = native.clone();
    server
        .respondent::<Ping, Pong, _>("files", move |_| {
            TaskHandle::rejected(TaskError::Native(thrown.clone()))
        })
        .unwrap();

    let reply = client.request::<Ping, Pong>(&Ping { n: 1 }).await;
    assert_eq!(reply, Settlement::Rejected(TaskError::Native(native)));
}

#[tokio::test]
async fn cancelled_respondent_cancels_the_requester() {
    let (client, server) = pair();
    server
        .respondent::<Ping, Pong, _>("math", |_| {
            let handle: TaskHandle<Pong> = TaskHandle::new();
            handle.cancel(None);
            handle
        })
        .unwrap();

    let reply = client.request::<Ping, Pong>(&Ping { n: 1 }).await;
    assert_eq!(reply, Settlement::Cancelled(None));
}

#[tokio::test]
async fn abort_reaches_the_respondent() {
    let (client, server) = pair();
    let served: Arc<Mutex<Option<TaskHandle<Pong>>>> = Arc::default();
    let captured = Arc::clone(&served);
    server
        .respondent::<Ping, Pong, _>("slow", move |_| {
            let handle: TaskHandle<Pong> = TaskHandle::new();
            *captured.lock().unwrap() = Some(handle.clone());
            handle
        })
        .unwrap();

    let request = client.request::<Ping, Pong>(&Ping { n: 1 });
    settle_spawned().await;
    let respondent_side = served.lock().unwrap().clone().unwrap();
    assert!(respondent_side.is_processing());

    request.abort(None);
    assert!(request.is_canceling());

    assert_eq!(request.wait().await, Settlement::Cancelled(None));
    assert_eq!(respondent_side.settlement(), Some(Settlement::Cancelled(None)));
    assert_eq!(server.serving_requests(), 0);
}

#[tokio::test]
async fn late_reply_wins_over_an_abort_in_flight() {
    let (left, right) = MemoryLink::pair();
    let client = ChannelTransport::new(Arc::new(left), TransportConfig::default());
    let request = client.request_payload(Payload::of(&Ping { n: 1 }).unwrap());

    let sent = right.recv().await.unwrap();
    let sequence = Package::from_packed(&sent.parse_body().unwrap())
        .unwrap()
        .sequence();
    request.abort(None);
    assert_eq!(
        right.recv().await.map(|frame| frame.channel),
        Some(Channel::Request)
    );

    let reply = Package::new(sequence).with_payload(Payload::of(&Pong { n: 2 }).unwrap());
    right.send(Frame::new(Channel::Response, &reply)).unwrap();
    assert_eq!(request.wait().await, Settlement::Resolved(reply));
}

#[tokio::test]
async fn unregistered_signature_is_an_error() {
    let (client, _server) = pair();
    let reply = client.request::<Ping, Pong>(&Ping { n: 1 }).await;
    assert_eq!(
        reply,
        Settlement::Rejected(TaskError::Remote(
            TransportError::NoRespondent("Ping".to_string()).to_string()
        ))
    );
}

#[tokio::test]
async fn second_respondent_names_the_first_owner() {
    let (_client, server) = pair();
    let first = server
        .respondent::<Ping, Pong, _>("math", |ping| TaskHandle::resolved(Pong { n: ping.n }))
        .unwrap();
    assert_eq!(first.id(), "math:Ping");

    let err = server
        .respondent::<Ping, Pong, _>("physics", |ping| TaskHandle::resolved(Pong { n: ping.n }))
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::DuplicateRespondent {
            signature: "Ping".to_string(),
            owner: "math".to_string(),
        }
    );
    assert!(err.to_string().contains("math"));

    first.unsubscribe();
    assert!(
        server
            .respondent::<Ping, Pong, _>("physics", |ping| TaskHandle::resolved(Pong { n: ping.n }))
            .is_ok()
    );
}

#[tokio::test]
async fn events_flow_to_typed_subscribers() {
    let (client, server) = pair();
    let mut ticks = client.subscribe::<Tick>().unwrap();

    server.notify(&Tick { at: 1 }).unwrap();
    server.notify(&Tick { at: 2 }).unwrap();

    assert_eq!(ticks.recv().await, Some(Tick { at: 1 }));
    assert_eq!(ticks.recv().await, Some(Tick { at: 2 }));
}

#[tokio::test]
async fn dropped_responder_cancels_pending_requests() {
    let (client, server) = pair();
    server
        .respondent::<Ping, Pong, _>("slow", |_| TaskHandle::new())
        .unwrap();

    let request = client.request::<Ping, Pong>(&Ping { n: 1 });
    settle_spawned().await;
    drop(server);

    assert_eq!(request.wait().await, Settlement::Cancelled(None));
}

#[tokio::test]
async fn dropped_requester_settles_its_pending_requests() {
    let (client, server) = pair();
    server
        .respondent::<Ping, Pong, _>("slow", |_| TaskHandle::new())
        .unwrap();

    let request = client.request::<Ping, Pong>(&Ping { n: 1 });
    settle_spawned().await;
    drop(client);

    assert_eq!(
        request.wait().await,
        Settlement::Rejected(TaskError::Transport(TransportError::Destroyed))
    );
    settle_spawned().await;
    assert_eq!(server.serving_requests(), 0);
}

#[tokio::test]
async fn lost_link_rejects_pending_requests() {
    let (left, right) = MemoryLink::pair();
    let client = ChannelTransport::new(Arc::new(left), TransportConfig::default());
    let request = client.request::<Ping, Pong>(&Ping { n: 1 });

    drop(right);
    assert_eq!(
        request.wait().await,
        Settlement::Rejected(TaskError::Transport(TransportError::Disconnected))
    );
}

#[tokio::test]
async fn destroy_rejects_pending_requests() {
    let (client, _server) = pair();
    let request = client.request::<Ping, Pong>(&Ping { n: 1 });

    client.destroy();
    assert_eq!(
        request.wait().await,
        Settlement::Rejected(TaskError::Transport(TransportError::Destroyed))
    );
    assert_eq!(
        client.request::<Ping, Pong>(&Ping { n: 2 }).settlement(),
        Some(Settlement::Rejected(TaskError::Transport(
            TransportError::Destroyed
        )))
    );
}

#[tokio::test]
async fn package_with_sequence_seven_is_answered_in_kind() {
    let (left, right) = MemoryLink::pair();
    let server = ChannelTransport::new(Arc::new(left), TransportConfig::default());
    server
        .respondent::<Ping, Pong, _>("math", |ping| TaskHandle::resolved(Pong { n: ping.n * 2 }))
        .unwrap();

    let request = json!({ "seq": 7, "code": 0, "payload": { "Ping": { "n": 21 } } });
    right
        .send(Frame {
            channel: Channel::Request,
            body: request.to_string(),
        })
        .unwrap();

    let frame = right.recv().await.unwrap();
    assert_eq!(frame.channel, Channel::Response);
    let reply = Package::from_packed(&frame.parse_body().unwrap()).unwrap();
    assert_eq!(reply.sequence(), 7);
    assert_eq!(reply.code(), Code::Done);
    assert_eq!(reply.decode::<Pong>(), Ok(Pong { n: 42 }));
}
