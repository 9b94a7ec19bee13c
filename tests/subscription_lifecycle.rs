// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for subscription lifecycle and notification delivery
//! against the in-memory server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use uasub_lib::dispatch::{DispatchObserver, TracingObserver};
use uasub_lib::protocol::NotificationBatch;
use uasub_lib::subscription::{
    ClientHandle, DataChangeMeta, EventNotification, Handler, HandlerResult, SubscriptionSettings,
};
use uasub_lib::testing::{MockServer, RecordingHandler};
use uasub_lib::types::{DataValue, NodeRef, QualifiedName, StatusCode, Variant};
use uasub_lib::{
    Error, OverflowPolicy, ProtocolError, Session, SessionConfig, SubscriptionId, SubscriptionState,
};

const INTERVAL: Duration = Duration::from_millis(500);
const WAIT: Duration = Duration::from_secs(5);

struct Fixture {
    server: MockServer,
    session: Session<MockServer>,
    handler: RecordingHandler,
    var: NodeRef,
    other: NodeRef,
}

fn fixture_with(config: SessionConfig) -> Fixture {
    let server = MockServer::new();
    let object = server.add_object(
        &NodeRef::objects(),
        NodeRef::numeric(2, 1),
        QualifiedName::new(2, "MyObject"),
    );
    let var = server.add_variable(&object, NodeRef::numeric(2, 2), QualifiedName::new(2, "MyVariable"), 0_i32);
    let other = server.add_variable(&object, NodeRef::numeric(2, 3), QualifiedName::new(2, "Other"), 0_i32);

    let session = Session::connect(server.clone(), config).unwrap();
    Fixture {
        server,
        session,
        handler: RecordingHandler::new(),
        var,
        other,
    }
}

fn fixture() -> Fixture {
    fixture_with(SessionConfig::default())
}

fn change(sub: SubscriptionId, seq: u32, handle: ClientHandle, value: i32) -> NotificationBatch {
    NotificationBatch::new(sub, seq).with_data_change(handle, DataValue::new(value))
}

/// Waits until the dispatcher has processed `count` batches in total.
async fn wait_for_batches(session: &Session<MockServer>, count: u64) {
    let processed = || {
        let stats = session.dispatch_stats();
        stats.batches_delivered + stats.keep_alives + stats.batches_dropped()
    };
    tokio::time::timeout(WAIT, async {
        while processed() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("batches were not processed in time");
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn registered_handles_follow_subscribe_and_unsubscribe() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        assert_eq!(sub.state(), SubscriptionState::Active);

        let a = sub.subscribe_data_change(&fx.var).await.unwrap();
        let b = sub.subscribe_data_change(&fx.other).await.unwrap();
        let c = sub.subscribe_data_change(&fx.var).await.unwrap();
        assert_eq!(sub.handles(), vec![a, b, c]);

        sub.unsubscribe(b).await.unwrap();
        assert_eq!(sub.handles(), vec![a, c]);

        let d = sub.subscribe_events().await.unwrap();
        sub.unsubscribe(a).await.unwrap();
        assert_eq!(sub.handles(), vec![c, d]);
        assert!(sub.event_filter_active());

        // The server holds exactly the same items.
        let mut on_server: Vec<_> = fx
            .server
            .monitored_items(sub.id())
            .into_iter()
            .map(|item| item.client_handle)
            .collect();
        on_server.sort();
        assert_eq!(on_server, sub.handles());
    }

    #[tokio::test]
    async fn handles_are_never_reused() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();

        let first = sub.subscribe_data_change(&fx.var).await.unwrap();
        let middle = sub.subscribe_data_change(&fx.var).await.unwrap();
        let last = sub.subscribe_data_change(&fx.var).await.unwrap();
        assert_eq!(first, ClientHandle::new(1));

        sub.unsubscribe(middle).await.unwrap();
        let fourth = sub.subscribe_data_change(&fx.var).await.unwrap();

        assert!(fourth > first && fourth > middle && fourth > last);
    }

    #[tokio::test]
    async fn double_unsubscribe_is_unknown_handle() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();

        sub.unsubscribe(handle).await.unwrap();
        let err = sub.unsubscribe(handle).await.unwrap_err();
        assert!(matches!(err, Error::UnknownHandle { handle: h, .. } if h == handle));
    }

    #[tokio::test]
    async fn every_operation_fails_after_delete() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();

        sub.delete().await.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Deleted);
        assert_eq!(sub.item_count(), 0);

        let id = sub.id();
        let already = |result: Result<(), Error>| matches!(result, Err(Error::AlreadyDeleted(d)) if d == id);
        assert!(already(sub.subscribe_data_change(&fx.var).await.map(drop)));
        assert!(already(sub.subscribe_events().await.map(drop)));
        assert!(already(sub.unsubscribe(handle).await));
        assert!(already(sub.modify(Duration::from_secs(1)).await.map(drop)));
        assert!(already(sub.set_publishing_enabled(false).await));
        assert!(already(sub.delete().await));
    }

    #[tokio::test]
    async fn rejected_item_leaves_nothing_behind() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();

        let err = sub
            .subscribe_data_change(&NodeRef::numeric(2, 999))
            .await
            .unwrap_err();
        match err {
            Error::Protocol(e) => assert_eq!(e.status(), Some(StatusCode::BAD_NODE_ID_UNKNOWN)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(sub.handles().is_empty());
        assert!(fx.server.monitored_items(sub.id()).is_empty());

        // The reserved handle is burnt, not reused.
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();
        assert_eq!(handle, ClientHandle::new(2));
    }

    #[tokio::test]
    async fn rejected_subscription_is_not_retried() {
        let fx = fixture();
        fx.server.reject_next(StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS);

        let err = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::Rejected { status, .. }) if status == StatusCode::BAD_TOO_MANY_SUBSCRIPTIONS
        ));
        assert_eq!(fx.server.request_count(), 1);
        assert_eq!(fx.session.subscriptions().subscription_count(), 0);
    }

    #[tokio::test]
    async fn modify_and_publishing_mode() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        assert_eq!(sub.publishing_interval(), INTERVAL);

        let revised = sub.modify(Duration::from_millis(250)).await.unwrap();
        assert_eq!(revised.publishing_interval, Duration::from_millis(250));
        assert_eq!(sub.publishing_interval(), Duration::from_millis(250));

        sub.set_publishing_enabled(false).await.unwrap();
        assert!(!sub.is_publishing_enabled());
        let on_server = fx.server.subscription_settings(sub.id()).unwrap();
        assert!(!on_server.publishing_enabled);
        assert_eq!(on_server.publishing_interval, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn failed_delete_returns_to_active() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();

        fx.server.reject_next(StatusCode::BAD);
        assert!(sub.delete().await.is_err());
        assert_eq!(sub.state(), SubscriptionState::Active);
        assert!(fx.session.subscriptions().contains(sub.id()));

        sub.delete().await.unwrap();
        assert!(!fx.session.subscriptions().contains(sub.id()));
    }

    #[tokio::test]
    async fn delete_of_expired_subscription_succeeds() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        fx.server.expire_subscription(sub.id());

        sub.delete().await.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_item_is_not_registered() {
        let fx = fixture_with(SessionConfig::default().with_request_timeout(Duration::from_secs(1)));
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();

        fx.server.stall_next(Duration::from_secs(10));
        let err = sub.subscribe_data_change(&fx.var).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1000)));

        // The server created the item; the client never registered it.
        assert_eq!(fx.server.monitored_items(sub.id()).len(), 1);
        assert!(sub.handles().is_empty());
        assert!(matches!(
            sub.unsubscribe(ClientHandle::new(1)).await,
            Err(Error::UnknownHandle { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn per_handle_timeout_overrides_session_timeout() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let hurried = sub.clone().with_timeout(Duration::from_millis(200));

        fx.server.stall_next(Duration::from_secs(1));
        let err = hurried.subscribe_data_change(&fx.var).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(200)));
        assert_eq!(sub.timeout(), fx.session.config().request_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_fail_fast_while_delete_is_in_flight() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();
        let id = sub.id();

        fx.server.stall_next(Duration::from_secs(1));
        let deleting = tokio::spawn({
            let sub = sub.clone();
            async move { sub.delete().await }
        });
        while sub.state() != SubscriptionState::Deleting {
            tokio::task::yield_now().await;
        }

        let requests = fx.server.request_count();
        assert!(matches!(
            sub.subscribe_data_change(&fx.other).await,
            Err(Error::Deleting(d)) if d == id
        ));
        assert!(matches!(sub.unsubscribe(handle).await, Err(Error::Deleting(d)) if d == id));
        assert!(matches!(sub.delete().await, Err(Error::Deleting(d)) if d == id));
        assert_eq!(fx.server.request_count(), requests, "nothing reached the server");

        deleting.await.unwrap().unwrap();
        assert_eq!(sub.state(), SubscriptionState::Deleted);
        assert!(matches!(sub.delete().await, Err(Error::AlreadyDeleted(d)) if d == id));
    }
}

// ============================================================================
// Delivery
// ============================================================================

mod delivery {
    use super::*;

    #[tokio::test]
    async fn late_batch_after_unsubscribe_is_not_delivered() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();
        assert_eq!(handle, ClientHandle::new(1));

        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let value = DataValue::new(42_i32)
            .with_status(StatusCode::GOOD)
            .with_source_timestamp(t0);
        fx.server
            .push(NotificationBatch::new(sub.id(), 1).with_data_change(handle, value))
            .await
            .unwrap();
        assert!(fx.handler.wait_for_calls(1, WAIT).await);

        let changes = fx.handler.data_changes();
        assert_eq!(changes.len(), 1);
        let (node, value, meta) = &changes[0];
        assert_eq!(node, &fx.var);
        assert_eq!(value, &Variant::from(42_i32));
        assert_eq!(meta.status, StatusCode::GOOD);
        assert_eq!(meta.source_timestamp, Some(t0));

        sub.unsubscribe(handle).await.unwrap();
        fx.server.push(change(sub.id(), 2, handle, 43)).await.unwrap();
        wait_for_batches(&fx.session, 2).await;

        assert_eq!(fx.handler.data_change_count(), 1);
        assert_eq!(fx.session.dispatch_stats().skipped_unknown_handles, 1);
    }

    #[tokio::test]
    async fn out_of_order_batch_is_dropped() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();

        fx.server.push(change(sub.id(), 5, handle, 5)).await.unwrap();
        fx.server.push(change(sub.id(), 3, handle, 3)).await.unwrap();
        fx.server.push(change(sub.id(), 5, handle, 5)).await.unwrap();
        wait_for_batches(&fx.session, 3).await;

        let sequences: Vec<_> = fx
            .handler
            .data_changes()
            .into_iter()
            .map(|(_, _, meta)| meta.sequence_number)
            .collect();
        assert_eq!(sequences, [5]);
        assert_eq!(fx.session.dispatch_stats().dropped_stale, 2);
    }

    #[tokio::test]
    async fn batch_for_deleted_subscription_is_dropped() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();
        sub.delete().await.unwrap();

        fx.server.push(change(sub.id(), 1, handle, 1)).await.unwrap();
        wait_for_batches(&fx.session, 1).await;

        assert!(fx.handler.is_empty());
        assert_eq!(fx.session.dispatch_stats().dropped_unknown_subscription, 1);
    }

    #[tokio::test]
    async fn failing_event_handler_does_not_stop_delivery() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_events().await.unwrap();

        let fields = |msg: &str| {
            vec![
                Variant::Empty,
                Variant::Empty,
                Variant::from("Server"),
                Variant::Empty,
                Variant::from(msg),
                Variant::from(500_u16),
            ]
        };
        fx.handler.fail_next_events(1);
        fx.server
            .push(
                NotificationBatch::new(sub.id(), 1)
                    .with_event(handle, fields("first"))
                    .with_event(handle, fields("second")),
            )
            .await
            .unwrap();
        fx.server
            .push(NotificationBatch::new(sub.id(), 2).with_event(handle, fields("third")))
            .await
            .unwrap();
        wait_for_batches(&fx.session, 2).await;

        let messages: Vec<_> = fx
            .handler
            .events()
            .iter()
            .filter_map(|event| event.get("Message").and_then(Variant::as_str).map(str::to_string))
            .collect();
        assert_eq!(messages, ["second", "third"]);
        assert_eq!(fx.session.dispatch_stats().handler_errors, 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_delivery() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();

        fx.handler.panic_next_data_changes(1);
        fx.server.push(change(sub.id(), 1, handle, 1)).await.unwrap();
        fx.server.push(change(sub.id(), 2, handle, 2)).await.unwrap();
        wait_for_batches(&fx.session, 2).await;

        assert_eq!(fx.handler.data_change_count(), 1);
        assert_eq!(fx.session.dispatch_stats().handler_panics, 1);
        assert!(fx.session.dispatcher().is_running());
    }

    #[tokio::test]
    async fn batches_keep_global_arrival_order() {
        let fx = fixture();
        let a = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let b = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let ha = a.subscribe_data_change(&fx.var).await.unwrap();
        let hb = b.subscribe_data_change(&fx.other).await.unwrap();

        fx.server.push(change(a.id(), 1, ha, 1)).await.unwrap();
        fx.server.push(change(b.id(), 1, hb, 2)).await.unwrap();
        fx.server.push(change(b.id(), 2, hb, 3)).await.unwrap();
        fx.server.push(change(a.id(), 2, ha, 4)).await.unwrap();
        assert!(fx.handler.wait_for_calls(4, WAIT).await);

        let values: Vec<_> = fx
            .handler
            .data_changes()
            .into_iter()
            .filter_map(|(_, value, _)| value.as_i64())
            .collect();
        assert_eq!(values, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn keep_alives_are_counted() {
        let fx = fixture();
        let sub = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();

        fx.server.push(NotificationBatch::new(sub.id(), 1)).await.unwrap();
        wait_for_batches(&fx.session, 1).await;

        let stats = fx.session.dispatch_stats();
        assert_eq!(stats.keep_alives, 1);
        assert_eq!(stats.batches_delivered, 0);
        assert!(fx.handler.is_empty());
    }

    #[tokio::test]
    async fn gaps_reach_the_observer() {
        #[derive(Default)]
        struct GapCounter {
            missing: AtomicU64,
        }

        impl DispatchObserver for GapCounter {
            fn sequence_gap(&self, _sub: SubscriptionId, _last: u32, _received: u32, missing: u32) {
                self.missing.fetch_add(u64::from(missing), Ordering::SeqCst);
            }
        }

        let server = MockServer::new();
        let var = server.add_variable(
            &NodeRef::objects(),
            NodeRef::numeric(2, 2),
            QualifiedName::new(2, "MyVariable"),
            0_i32,
        );
        let observer = Arc::new(GapCounter::default());
        let session = Session::connect_with_observer(
            Arc::new(server.clone()),
            SessionConfig::default(),
            Arc::clone(&observer) as Arc<dyn DispatchObserver>,
        )
        .unwrap();
        let handler = RecordingHandler::new();
        let sub = session.create_subscription(INTERVAL, handler.clone()).await.unwrap();
        let handle = sub.subscribe_data_change(&var).await.unwrap();

        server.push(change(sub.id(), 1, handle, 1)).await.unwrap();
        server.push(change(sub.id(), 4, handle, 4)).await.unwrap();
        assert!(handler.wait_for_calls(2, WAIT).await);

        assert_eq!(observer.missing.load(Ordering::SeqCst), 2);
        assert_eq!(session.dispatch_stats().sequence_gaps, 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_overflow_is_dropped_and_pump_keeps_running() {
        /// Blocks inside its first callback until the gate is released.
        struct Gated {
            gate: Arc<Mutex<()>>,
            entered: AtomicBool,
            inner: RecordingHandler,
        }

        impl Handler for Gated {
            fn on_data_change(
                &self,
                node: &NodeRef,
                value: &Variant,
                meta: &DataChangeMeta,
            ) -> HandlerResult {
                if !self.entered.swap(true, Ordering::SeqCst) {
                    drop(self.gate.lock());
                }
                self.inner.on_data_change(node, value, meta)
            }

            fn on_event(&self, event: &EventNotification) -> HandlerResult {
                self.inner.on_event(event)
            }
        }

        let config = SessionConfig::default()
            .with_queue_capacity(1)
            .with_overflow_policy(OverflowPolicy::Reject);
        let fx = fixture_with(config);
        let gate = Arc::new(Mutex::new(()));
        let handler = Arc::new(Gated {
            gate: Arc::clone(&gate),
            entered: AtomicBool::new(false),
            inner: fx.handler.clone(),
        });
        let sub = fx
            .session
            .create_subscription_with(
                SubscriptionSettings::new(INTERVAL),
                Arc::clone(&handler) as Arc<dyn Handler>,
            )
            .await
            .unwrap();
        let handle = sub.subscribe_data_change(&fx.var).await.unwrap();

        let closed = gate.lock();
        fx.server.push(change(sub.id(), 1, handle, 1)).await.unwrap();
        tokio::time::timeout(WAIT, async {
            while !handler.entered.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        // 2 fills the queue, 3 finds it full.
        fx.server.push(change(sub.id(), 2, handle, 2)).await.unwrap();
        fx.server.push(change(sub.id(), 3, handle, 3)).await.unwrap();
        tokio::time::timeout(WAIT, async {
            while fx.session.dispatch_stats().dropped_overflow < 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        drop(closed);
        assert!(fx.handler.wait_for_calls(2, WAIT).await);

        fx.server.push(change(sub.id(), 4, handle, 4)).await.unwrap();
        assert!(fx.handler.wait_for_calls(3, WAIT).await);

        let values: Vec<_> = fx
            .handler
            .data_changes()
            .into_iter()
            .filter_map(|(_, value, _)| value.as_i64())
            .collect();
        assert_eq!(values, [1, 2, 4]);
        assert_eq!(fx.session.dispatch_stats().dropped_overflow, 1);
    }
}

// ============================================================================
// Session
// ============================================================================

mod session {
    use super::*;

    #[tokio::test]
    async fn close_deletes_everything_and_stops_delivery() {
        let fx = fixture();
        let _a = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        let _b = fx
            .session
            .create_subscription(INTERVAL, fx.handler.clone())
            .await
            .unwrap();
        assert_eq!(fx.server.live_subscriptions().len(), 2);

        fx.session.close().await.unwrap();
        assert!(fx.server.live_subscriptions().is_empty());
        assert_eq!(fx.session.subscriptions().subscription_count(), 0);
        assert!(!fx.session.dispatcher().is_running());
        assert!(matches!(
            fx.session.flush_notifications().await,
            Err(Error::DispatcherStopped)
        ));
    }

    #[tokio::test]
    async fn notification_stream_can_only_be_taken_once() {
        let server = MockServer::new();
        let _session = Session::connect(server.clone(), SessionConfig::default()).unwrap();

        let err = Session::connect_with_observer(
            Arc::new(server),
            SessionConfig::default(),
            Arc::new(TracingObserver::new()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = SessionConfig::default().with_queue_capacity(0);
        let err = Session::connect(MockServer::new(), config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn connect_needs_a_runtime() {
        let err = Session::connect(MockServer::new(), SessionConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
    }
}
