// SPDX-License-Identifier: MPL-2.0

//! Walk-through of the client API against the in-memory server.
//!
//! Browses to a variable, subscribes to its changes and to server events,
//! tears the subscription down and finally calls a method.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example client
//! ```

use std::time::Duration;

use uasub_lib::protocol::NotificationBatch;
use uasub_lib::subscription::{DataChangeMeta, EventNotification, Handler, HandlerResult};
use uasub_lib::testing::MockServer;
use uasub_lib::types::{DataValue, NodeRef, QualifiedName, StatusCode, Variant};
use uasub_lib::{Session, SessionConfig};

const NAMESPACE: &str = "http://examples.freeopcua.github.io";

struct SubHandler;

impl Handler for SubHandler {
    fn on_data_change(&self, node: &NodeRef, value: &Variant, _meta: &DataChangeMeta) -> HandlerResult {
        println!("New data change event {node} {}", value.to_json());
        Ok(())
    }

    fn on_event(&self, event: &EventNotification) -> HandlerResult {
        let fields: Vec<String> = event
            .iter()
            .map(|(name, value)| format!("{name}={}", value.to_json()))
            .collect();
        println!("New event {}", fields.join(", "));
        Ok(())
    }
}

/// Builds the demo address space: `Objects/2:MyObject/{2:MyVariable, 2:multiply}`.
fn demo_server() -> MockServer {
    let server = MockServer::new();
    server.add_namespace("urn:freeopcua:python:server");
    let idx = server.add_namespace(NAMESPACE);

    let object = server.add_object(
        &NodeRef::objects(),
        NodeRef::numeric(idx, 1),
        QualifiedName::new(idx, "MyObject"),
    );
    server.add_variable(&object, NodeRef::numeric(idx, 2), QualifiedName::new(idx, "MyVariable"), 6.7_f64);
    server.add_method(&object, NodeRef::numeric(idx, 3), QualifiedName::new(idx, "multiply"), |args| {
        let [x, y] = args else {
            return Err(StatusCode::BAD_ARGUMENTS_MISSING);
        };
        Ok(vec![Variant::from(format!("{} * {}", x.to_json(), y.to_json()))])
    });
    server
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let server = demo_server();
    let session = Session::connect(server.clone(), SessionConfig::default())?;

    tracing::info!("Root node is: {}", session.nodes().root());
    tracing::info!("Objects node is: {}", session.nodes().objects());
    let children = session.nodes().root().children().await?;
    let names: Vec<String> = children.iter().map(|c| c.browse_name.to_string()).collect();
    tracing::info!("Children of root are: {names:?}");

    let idx = session.namespace_index(NAMESPACE).await?;
    tracing::info!("index of our namespace is {idx}");

    let root = session.nodes().root();
    let myvar = root.child(["0:Objects", "2:MyObject", "2:MyVariable"]).await?;
    let obj = root.child(["0:Objects", "2:MyObject"]).await?;
    tracing::info!("myvar is: {myvar}");

    let sub = session
        .create_subscription(Duration::from_millis(500), SubHandler)
        .await?;
    let handle = sub.subscribe_data_change(myvar.node_ref()).await?;

    // Stand-in for the server's publish cycle.
    let publisher = {
        let server = server.clone();
        let id = sub.id();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            for seq in 1..=10_u32 {
                ticker.tick().await;
                let value = DataValue::new(6.7 + f64::from(seq) / 10.0);
                let batch = NotificationBatch::new(id, seq).with_data_change(handle, value);
                if server.push(batch).await.is_err() {
                    break;
                }
            }
        })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    publisher.await?;

    let events = sub.subscribe_events().await?;
    let fields = vec![
        Variant::from("e1"),
        Variant::from(NodeRef::base_event_type()),
        Variant::from("Server"),
        Variant::from(chrono::Utc::now()),
        Variant::from("demo event"),
        Variant::from(100_u16),
    ];
    server
        .push(NotificationBatch::new(sub.id(), 11).with_event(events, fields))
        .await?;
    session.flush_notifications().await?;

    sub.unsubscribe(handle).await?;
    sub.delete().await?;

    let res = obj
        .call_method("2:multiply", vec![Variant::from(3_i32), Variant::from("klk")])
        .await?;
    tracing::info!("method result is: {res:?}");

    tracing::info!(stats = ?session.dispatch_stats(), "Closing session");
    session.close().await?;
    Ok(())
}
