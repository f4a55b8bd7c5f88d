use actgate_core::ErrorKind;
use actgate_core::directory::StaticEndpointDirectory;
use actgate_core::invoker::{DynamicInvoker, InvokeError, TransportFailure};
use actgate_core::schema::ServiceKey;
use actgate_core::settings::{EndpointSettings, InvokerSettings};
use echo_service::{Behavior, EchoServer};
use router_fixture::{FixtureCompiler, cache};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

mod router_fixture;

fn invoker(port: u16) -> DynamicInvoker {
    let directory = StaticEndpointDirectory::new(EndpointSettings {
        host: "127.0.0.1".to_string(),
        ports: HashMap::from([("router".to_string(), port)]),
        ..Default::default()
    });
    let settings = InvokerSettings {
        response_timeout_ms: 5_000,
        ..Default::default()
    };

    DynamicInvoker::new(
        cache(Arc::new(FixtureCompiler::default()), 3600),
        Arc::new(directory),
        settings,
    )
}

#[tokio::test]
async fn test_unary_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(EchoServer::new(Behavior::Echo))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    let response = invoker(port)
        .invoke(
            &ServiceKey::new("router", "Echo"),
            "Ping",
            json!({ "text": "over the wire" }),
            "evt-1",
        )
        .await
        .unwrap();

    assert_eq!(response, json!({ "text": "over the wire" }));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = invoker(port)
        .invoke(
            &ServiceKey::new("router", "Echo"),
            "Ping",
            json!({ "text": "anyone?" }),
            "evt-1",
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    match err {
        InvokeError::Transport {
            source: TransportFailure::Connect(_),
            request,
            ..
        } => assert_eq!(request["text"], "anyone?"),
        other => panic!("Expected a connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unpublished_component_is_not_found() {
    let err = invoker(1)
        .invoke_by_name("billing:Echo", "Ping", json!({}), "evt-1")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}
