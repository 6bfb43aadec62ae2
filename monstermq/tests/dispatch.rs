// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Dispatch plane tests against in-memory stores: subscription options,
//! retained replay, offline queues with expiry and session takeover.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::timeout;

use codec::v5::RetainHandling;
use codec::QoS;
use monstermq::bus::LocalBus;
use monstermq::cluster::CoordinatorHandle;
use monstermq::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, OutboundPublish, SubscriptionRequest,
};
use monstermq::dispatcher::Dispatcher;
use monstermq::message::BrokerMessage;
use monstermq::scheduler;
use monstermq::store::{
    MemoryRetainedStore, MemorySessionStore, RetainedBackend, SessionBackend,
};
use monstermq::types::{now_ms, SessionGid};

const LISTENER_ID: u32 = 0;

struct Harness {
    dispatcher_tx: Sender<ListenerToDispatcherCmd>,
    listener_rx: Receiver<DispatcherToListenerCmd>,

    // Keep the reverse channels alive for the dispatcher's run loop.
    _archive_tx: Sender<monstermq::commands::ArchiveToDispatcherCmd>,
    _metrics_tx: Sender<monstermq::commands::MetricsToDispatcherCmd>,
}

impl Harness {
    fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let (dispatcher_tx, listener_to_dispatcher_rx) = mpsc::channel(64);
        let (dispatcher_to_listener_tx, listener_rx) = mpsc::channel(64);
        let (archive_out_tx, mut archive_out_rx) = mpsc::channel(64);
        let (archive_tx, archive_rx) = mpsc::channel(64);
        let (metrics_out_tx, mut metrics_out_rx) = mpsc::channel(64);
        let (metrics_tx, metrics_rx) = mpsc::channel(64);
        let (scheduler_handle, timer_receiver) = scheduler::start();

        let mut dispatcher = Dispatcher::new(
            "node-0",
            SessionBackend::Memory(MemorySessionStore::new()),
            RetainedBackend::Memory(MemoryRetainedStore::new()),
            CoordinatorHandle::standalone("node-0"),
            LocalBus::new(),
            scheduler_handle,
            timer_receiver,
            1000,
            Duration::from_secs(60),
            vec![(LISTENER_ID, dispatcher_to_listener_tx)],
            listener_to_dispatcher_rx,
            archive_out_tx,
            archive_rx,
            metrics_out_tx,
            metrics_rx,
        );
        tokio::spawn(async move { dispatcher.run_loop().await });

        // Sink the archive and metrics streams so the dispatcher never
        // blocks on them.
        tokio::spawn(async move { while archive_out_rx.recv().await.is_some() {} });
        tokio::spawn(async move { while metrics_out_rx.recv().await.is_some() {} });

        Self {
            dispatcher_tx,
            listener_rx,
            _archive_tx: archive_tx,
            _metrics_tx: metrics_tx,
        }
    }

    async fn connect(&mut self, gid: SessionGid, client_id: &str, clean_start: bool, expiry: u32) -> bool {
        self.dispatcher_tx
            .send(ListenerToDispatcherCmd::SessionConnected {
                gid,
                client_id: client_id.to_string(),
                clean_start,
                session_expiry_interval: expiry,
                receive_maximum: 100,
                maximum_packet_size: u32::MAX,
                topic_alias_maximum: 10,
                will: None,
            })
            .await
            .unwrap();

        match self.recv().await {
            DispatcherToListenerCmd::ConnectAck {
                session_id,
                session_present,
                ..
            } => {
                assert_eq!(session_id, gid.session_id());
                session_present
            }
            other => panic!("expected connect ack, got {other:?}"),
        }
    }

    async fn disconnect(&mut self, gid: SessionGid, client_id: &str) {
        self.dispatcher_tx
            .send(ListenerToDispatcherCmd::SessionDisconnected {
                gid,
                client_id: client_id.to_string(),
                publish_will: false,
                requeue: Vec::new(),
            })
            .await
            .unwrap();
    }

    async fn subscribe(&mut self, gid: SessionGid, client_id: &str, request: SubscriptionRequest) {
        self.dispatcher_tx
            .send(ListenerToDispatcherCmd::Subscribe(
                gid,
                client_id.to_string(),
                vec![request],
            ))
            .await
            .unwrap();
    }

    async fn publish(&mut self, gid: SessionGid, message: BrokerMessage) {
        self.dispatcher_tx
            .send(ListenerToDispatcherCmd::Publish(gid, message))
            .await
            .unwrap();
    }

    async fn recv(&mut self) -> DispatcherToListenerCmd {
        timeout(Duration::from_secs(2), self.listener_rx.recv())
            .await
            .expect("dispatcher reply timed out")
            .expect("dispatcher channel closed")
    }

    async fn recv_publish(&mut self) -> (u64, OutboundPublish) {
        match self.recv().await {
            DispatcherToListenerCmd::Publish(session_id, publish) => (session_id, publish),
            other => panic!("expected publish, got {other:?}"),
        }
    }

    async fn expect_silence(&mut self) {
        if let Ok(cmd) = timeout(Duration::from_millis(200), self.listener_rx.recv()).await {
            panic!("expected no delivery, got {cmd:?}");
        }
    }
}

fn request(filter: &str, qos: QoS) -> SubscriptionRequest {
    SubscriptionRequest {
        filter: filter.to_string(),
        qos,
        no_local: false,
        retain_as_published: false,
        retain_handling: RetainHandling::Send,
    }
}

fn message(topic: &str, qos: QoS, origin: &str, payload: &'static [u8]) -> BrokerMessage {
    BrokerMessage::new(topic, Bytes::from_static(payload), qos, origin, now_ms())
}

#[tokio::test]
async fn test_no_local_suppresses_echo() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let other = SessionGid::new(LISTENER_ID, 2);

    assert!(!harness.connect(publisher, "c-pub", true, 0).await);
    assert!(!harness.connect(other, "c-other", true, 0).await);

    let mut no_local = request("t", QoS::AtMostOnce);
    no_local.no_local = true;
    harness.subscribe(publisher, "c-pub", no_local).await;
    harness.subscribe(other, "c-other", request("t", QoS::AtMostOnce)).await;

    harness
        .publish(publisher, message("t", QoS::AtMostOnce, "c-pub", b"ping"))
        .await;

    // Only the other subscriber hears the message.
    let (session_id, publish) = harness.recv_publish().await;
    assert_eq!(session_id, other.session_id());
    assert_eq!(publish.message.payload().as_ref(), b"ping");
    harness.expect_silence().await;
}

#[tokio::test]
async fn test_retain_as_published_controls_flag() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let plain = SessionGid::new(LISTENER_ID, 2);
    let rap = SessionGid::new(LISTENER_ID, 3);

    harness.connect(publisher, "c-pub", true, 0).await;
    harness.connect(plain, "c-plain", true, 0).await;
    harness.connect(rap, "c-rap", true, 0).await;

    harness.subscribe(plain, "c-plain", request("r", QoS::AtMostOnce)).await;
    let mut rap_request = request("r", QoS::AtMostOnce);
    rap_request.retain_as_published = true;
    harness.subscribe(rap, "c-rap", rap_request).await;

    let mut retained = message("r", QoS::AtMostOnce, "c-pub", b"v");
    retained.set_retain(true);
    harness.publish(publisher, retained).await;

    let mut flags = std::collections::HashMap::new();
    for _ in 0..2 {
        let (session_id, publish) = harness.recv_publish().await;
        flags.insert(session_id, publish.retain);
    }
    assert_eq!(flags.get(&plain.session_id()), Some(&false));
    assert_eq!(flags.get(&rap.session_id()), Some(&true));
}

#[tokio::test]
async fn test_retained_replay_and_clear() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let sub1 = SessionGid::new(LISTENER_ID, 2);
    let sub2 = SessionGid::new(LISTENER_ID, 3);

    harness.connect(publisher, "c-pub", true, 0).await;
    harness.connect(sub1, "c-sub1", true, 0).await;
    harness.connect(sub2, "c-sub2", true, 0).await;

    let mut retained = message("room/temp", QoS::AtMostOnce, "c-pub", b"21");
    retained.set_retain(true);
    harness.publish(publisher, retained).await;

    // A fresh subscribe replays exactly the stored message.
    harness
        .subscribe(sub1, "c-sub1", request("room/temp", QoS::AtMostOnce))
        .await;
    let (session_id, publish) = harness.recv_publish().await;
    assert_eq!(session_id, sub1.session_id());
    assert_eq!(publish.message.payload().as_ref(), b"21");
    harness.expect_silence().await;

    // A zero length retained publish clears the slot; its live delivery
    // still reaches the existing subscriber.
    let mut clear = message("room/temp", QoS::AtMostOnce, "c-pub", b"");
    clear.set_retain(true);
    harness.publish(publisher, clear).await;
    let (session_id, publish) = harness.recv_publish().await;
    assert_eq!(session_id, sub1.session_id());
    assert!(publish.message.payload().is_empty());

    harness
        .subscribe(sub2, "c-sub2", request("room/temp", QoS::AtMostOnce))
        .await;
    harness.expect_silence().await;
}

#[tokio::test]
async fn test_retain_handling_send_first_skips_existing() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let sub = SessionGid::new(LISTENER_ID, 2);

    harness.connect(publisher, "c-pub", true, 0).await;
    harness.connect(sub, "c-sub", true, 0).await;

    let mut retained = message("r", QoS::AtMostOnce, "c-pub", b"v");
    retained.set_retain(true);
    harness.publish(publisher, retained).await;

    let mut send_first = request("r", QoS::AtMostOnce);
    send_first.retain_handling = RetainHandling::SendFirst;
    harness.subscribe(sub, "c-sub", send_first.clone()).await;
    let (_, publish) = harness.recv_publish().await;
    assert_eq!(publish.message.payload().as_ref(), b"v");

    // The second subscribe finds the pair already installed.
    harness.subscribe(sub, "c-sub", send_first).await;
    harness.expect_silence().await;

    let mut never = request("r", QoS::AtMostOnce);
    never.retain_handling = RetainHandling::NoSend;
    harness.subscribe(sub, "c-sub", never).await;
    harness.expect_silence().await;
}

#[tokio::test]
async fn test_qos_downgrade_to_subscription() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let sub = SessionGid::new(LISTENER_ID, 2);

    harness.connect(publisher, "c-pub", true, 0).await;
    harness.connect(sub, "c-sub", true, 0).await;
    harness.subscribe(sub, "c-sub", request("a/+", QoS::AtLeastOnce)).await;

    harness
        .publish(publisher, message("a/b", QoS::ExactOnce, "c-pub", b"x"))
        .await;

    let (_, publish) = harness.recv_publish().await;
    assert_eq!(publish.qos, QoS::AtLeastOnce);
    assert_eq!(publish.message.payload().as_ref(), b"x");
}

#[tokio::test]
async fn test_offline_queue_resumes_in_order_and_skips_expired() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let sub = SessionGid::new(LISTENER_ID, 2);

    harness.connect(publisher, "c-pub", true, 0).await;
    assert!(!harness.connect(sub, "c-sub", false, 3600).await);
    harness.subscribe(sub, "c-sub", request("s/#", QoS::AtLeastOnce)).await;
    harness.disconnect(sub, "c-sub").await;

    // Published three seconds ago: the two second expiry is spent, seven
    // of the ten seconds remain.
    let past = now_ms() - 3_000;
    let mut short = BrokerMessage::new(
        "s/x",
        Bytes::from_static(b"short"),
        QoS::AtLeastOnce,
        "c-pub",
        past,
    );
    short.properties_mut().message_expiry_interval = Some(2);
    let mut long = BrokerMessage::new(
        "s/y",
        Bytes::from_static(b"long"),
        QoS::AtLeastOnce,
        "c-pub",
        past + 1_000,
    );
    long.properties_mut().message_expiry_interval = Some(10);

    harness.publish(publisher, short).await;
    harness.publish(publisher, long).await;

    // Resume: the session is present and only the live message arrives,
    // with its expiry decremented.
    let resumed = SessionGid::new(LISTENER_ID, 3);
    assert!(harness.connect(resumed, "c-sub", false, 3600).await);

    let (session_id, publish) = harness.recv_publish().await;
    assert_eq!(session_id, resumed.session_id());
    assert_eq!(publish.message.topic(), "s/y");
    let remaining = publish.message.outbound_expiry(now_ms()).unwrap();
    assert!((6..=8).contains(&remaining), "remaining {remaining}");
    harness.expect_silence().await;
}

#[tokio::test]
async fn test_session_takeover_disconnects_old_connection() {
    let mut harness = Harness::start();
    let first = SessionGid::new(LISTENER_ID, 1);
    let second = SessionGid::new(LISTENER_ID, 2);

    harness.connect(first, "c-dup", true, 0).await;

    harness
        .dispatcher_tx
        .send(ListenerToDispatcherCmd::SessionConnected {
            gid: second,
            client_id: "c-dup".to_string(),
            clean_start: true,
            session_expiry_interval: 0,
            receive_maximum: 100,
            maximum_packet_size: u32::MAX,
            topic_alias_maximum: 10,
            will: None,
        })
        .await
        .unwrap();

    // The old session is told to go away, then the new one is acked.
    let mut saw_disconnect = false;
    let mut saw_ack = false;
    for _ in 0..2 {
        match harness.recv().await {
            DispatcherToListenerCmd::Disconnect(session_id, _reason) => {
                assert_eq!(session_id, first.session_id());
                saw_disconnect = true;
            }
            DispatcherToListenerCmd::ConnectAck { session_id, .. } => {
                assert_eq!(session_id, second.session_id());
                saw_ack = true;
            }
            other => panic!("unexpected cmd {other:?}"),
        }
    }
    assert!(saw_disconnect);
    assert!(saw_ack);
}

#[tokio::test]
async fn test_subscriptions_survive_reconnect() {
    let mut harness = Harness::start();
    let publisher = SessionGid::new(LISTENER_ID, 1);
    let sub = SessionGid::new(LISTENER_ID, 2);

    harness.connect(publisher, "c-pub", true, 0).await;
    harness.connect(sub, "c-sub", false, 3600).await;
    harness.subscribe(sub, "c-sub", request("p/#", QoS::AtMostOnce)).await;
    harness.disconnect(sub, "c-sub").await;

    let resumed = SessionGid::new(LISTENER_ID, 3);
    assert!(harness.connect(resumed, "c-sub", false, 3600).await);

    harness
        .publish(publisher, message("p/1", QoS::AtMostOnce, "c-pub", b"hello"))
        .await;
    let (session_id, publish) = harness.recv_publish().await;
    assert_eq!(session_id, resumed.session_id());
    assert_eq!(publish.message.topic(), "p/1");

    // A clean start wipes the stored subscriptions.
    harness.disconnect(resumed, "c-sub").await;
    let fresh = SessionGid::new(LISTENER_ID, 4);
    assert!(!harness.connect(fresh, "c-sub", true, 0).await);
    harness
        .publish(publisher, message("p/1", QoS::AtMostOnce, "c-pub", b"again"))
        .await;
    harness.expect_silence().await;
}
