//! End-to-end routing scenarios against a fake Portia server over TCP.

mod helpers;

use std::time::Duration;

use helpers::{FLAT_ROUTING, FakePortia, NESTED_ROUTING, dispatcher, record};
use portia_router::dispatch::RecordKind;
use portia_router::{DispatchError, RequestError, Route};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn inbound_records_observed_network_and_reaches_application() {
    let server = FakePortia::start().await;
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let target = assert_ok!(
        dispatcher
            .dispatch(
                RecordKind::Inbound,
                "t1",
                record(json!({"from_addr": "+27123456789", "content": "hello"})),
            )
            .await
    );

    assert_eq!(target, Route::default_endpoint("app"));
    assert_eq!(server.annotations("27123456789")["observed-network"], "mno1");

    let client = dispatcher.connections().acquire_client().await.unwrap();
    let resolution = client.resolve("27123456789").await.unwrap();
    assert_eq!(resolution.network.as_deref(), Some("mno1"));

    let published = dispatcher.publisher().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].connector, "app");
    assert_eq!(published[0].endpoint, "default");
    assert_eq!(published[0].record.as_map()["content"], "hello");

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn outbound_goes_to_transport_of_observed_network() {
    let server = FakePortia::start().await;
    server.annotate("27123456789", "observed-network", "mno2");
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let target = assert_ok!(
        dispatcher
            .dispatch(
                RecordKind::Outbound,
                "app",
                record(json!({"to_addr": "+27123456789"})),
            )
            .await
    );

    assert_eq!(target, Route::new("t2", "ep1"));
    let published = dispatcher.publisher().published();
    assert_eq!(published[0].kind, RecordKind::Outbound);
    assert_eq!(published[0].record.routing_endpoint(), "ep1");

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn outbound_to_unknown_number_fails_without_default() {
    let server = FakePortia::start().await;
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let err = assert_err!(
        dispatcher
            .dispatch(
                RecordKind::Outbound,
                "app",
                record(json!({"to_addr": "+27123456789"})),
            )
            .await
    );

    assert!(matches!(err, DispatchError::Unresolved { .. }));
    assert!(err.to_string().contains("Portia was unable to resolve"));
    assert!(dispatcher.publisher().published().is_empty());

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn flat_routing_falls_back_to_default_transport() {
    let server = FakePortia::start().await;
    server.annotate("27123456789", "observed-network", "mno9");
    let dispatcher = dispatcher(&server, FLAT_ROUTING);

    let target = dispatcher
        .dispatch_outbound(record(json!({"to_addr": "+27123456789"})))
        .await
        .unwrap();

    assert_eq!(target, Route::default_endpoint("t_default"));
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn flat_routing_inbound_annotates_mapped_mno() {
    let server = FakePortia::start().await;
    let dispatcher = dispatcher(&server, FLAT_ROUTING);

    dispatcher
        .dispatch(
            RecordKind::Inbound,
            "t2",
            record(json!({"from_addr": "0027111", "transport_name": "t2"})),
        )
        .await
        .unwrap();

    assert_eq!(server.annotations("27111")["observed-network"], "mno2");
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn events_are_forwarded_without_contacting_portia() {
    let server = FakePortia::start().await;
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let target = dispatcher
        .dispatch(
            RecordKind::Event,
            "t1",
            record(json!({"event_type": "ack", "user_message_id": "1"})),
        )
        .await
        .unwrap();

    assert_eq!(target, Route::default_endpoint("app"));
    assert!(server.received().is_empty());
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn concurrent_records_are_routed_independently() {
    let server = FakePortia::start().await;
    server.annotate("27000000001", "observed-network", "mno1");
    server.annotate("27000000002", "observed-network", "mno2");
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let (first, second, third) = tokio::join!(
        dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000001"}))),
        dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000002"}))),
        dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000003"}))),
    );

    assert_eq!(first.unwrap(), Route::default_endpoint("t1"));
    assert_eq!(second.unwrap(), Route::new("t2", "ep1"));
    assert!(matches!(third, Err(DispatchError::Unresolved { .. })));
    assert_eq!(dispatcher.publisher().published().len(), 2);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn connection_loss_fails_every_pending_record() {
    let server = FakePortia::start().await;
    server.set_mute(true);
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    let pending = async {
        tokio::join!(
            dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000001"}))),
            dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000002"}))),
            dispatcher.dispatch_outbound(record(json!({"to_addr": "+27000000003"}))),
        )
    };
    let disconnect = async {
        server.wait_for_requests(3).await;
        server.disconnect_all();
    };

    let ((first, second, third), ()) = tokio::time::timeout(
        Duration::from_secs(2),
        async { tokio::join!(pending, disconnect) },
    )
    .await
    .expect("pending records must fail promptly on connection loss");

    for result in [first, second, third] {
        assert!(matches!(
            result,
            Err(DispatchError::Request(RequestError::ConnectionClosed { .. }))
        ));
    }
    assert!(dispatcher.publisher().published().is_empty());

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn dispatcher_reconnects_after_connection_loss() {
    let server = FakePortia::start().await;
    server.annotate("27123456789", "observed-network", "mno1");
    let dispatcher = dispatcher(&server, NESTED_ROUTING);

    dispatcher
        .dispatch_outbound(record(json!({"to_addr": "+27123456789"})))
        .await
        .unwrap();
    let lost = dispatcher.connections().current_client().unwrap();
    server.disconnect_all();
    lost.closed().await;

    // The next record waits for the reconnect instead of failing.
    let target = dispatcher
        .dispatch_outbound(record(json!({"to_addr": "+27123456789"})))
        .await
        .unwrap();
    assert_eq!(target, Route::default_endpoint("t1"));

    dispatcher.shutdown().await;
}
