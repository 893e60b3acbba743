//! End-to-end request/response behavior over loopback sockets: happy-path
//! calls, dispatch error codes, batches, and frames the typed client would
//! never produce.

mod helpers;

use std::time::Duration;

use helpers::*;
use serde_json::{Value, json};

use wsrpc_client::{Client, ClientError, ConnectionState};
use wsrpc_proto::Params;
use wsrpc_server::HandlerError;

#[tokio::test]
async fn call_round_trip() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("add", |params, _socket| async move {
            let params = params.unwrap_or_else(Params::empty);
            let a = params.get_index(0).and_then(Value::as_i64).unwrap_or(0);
            let b = params.get_index(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    let sum = client
        .call("add", Some(Params::Array(vec![json!(19), json!(23)])))
        .await
        .unwrap();
    assert_eq!(sum, json!(42));

    client.close().await.unwrap();
    server.close().await;
}

#[tokio::test]
async fn named_params_reach_the_handler() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("greet", |params, _socket| async move {
            let name = params
                .and_then(|p| p.get("name").cloned())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "stranger".to_string());
            Ok(json!(format!("hello {name}")))
        })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    let params = Params::from_value(json!({"name": "ada"})).unwrap();
    let reply = client.call("greet", Some(params)).await.unwrap();
    assert_eq!(reply, json!("hello ada"));

    let reply = client.call("greet", None).await.unwrap();
    assert_eq!(reply, json!("hello stranger"));
    server.close().await;
}

#[tokio::test]
async fn calls_fail_until_connected() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("ping", |_, _| async move { Ok(json!("pong")) })
        .await;

    let url = ws_url(server.local_addr(), "/");
    let client = Client::builder().with_reconnect(false).build(&url).unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.call("ping", None).await,
        Err(ClientError::NotReady)
    ));

    client.connect().await.unwrap();
    assert!(wait_until(|| client.state() == ConnectionState::Open).await);
    assert_eq!(client.call("ping", None).await.unwrap(), json!("pong"));

    // Deliberate close puts the client back out of service.
    client.close().await.unwrap();
    assert!(wait_until(|| matches!(client.state(), ConnectionState::Closed(_))).await);
    assert!(matches!(
        client.call("ping", None).await,
        Err(ClientError::NotReady)
    ));
    server.close().await;
}

#[tokio::test]
async fn notifications_reach_the_handler_without_a_reply() {
    init_tracing();
    let server = bind_server().await;
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    server
        .register_fn("log", move |params, _socket| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(params);
                Ok(Value::Null)
            }
        })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    client
        .notify("log", Some(Params::Array(vec![json!("line one")])))
        .await
        .unwrap();

    let seen = recv_within(&mut seen_rx, Duration::from_secs(2))
        .await
        .expect("handler never saw the notification");
    assert_eq!(seen, Some(Params::Array(vec![json!("line one")])));
    assert_eq!(client.state(), ConnectionState::Open);
    server.close().await;
}

#[tokio::test]
async fn handler_failures_surface_as_rpc_errors() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("explode", |_, _| async move {
            Err(HandlerError::failure("Error", "the gasket blew"))
        })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    let Err(ClientError::Rpc(error)) = client.call("explode", None).await else {
        panic!("expected an rpc error");
    };
    assert_eq!(error.code, -32000);
    assert_eq!(error.message, "Error");
    assert_eq!(error.data, Some(json!("the gasket blew")));
    server.close().await;
}

#[tokio::test]
async fn unknown_methods_are_reported() {
    init_tracing();
    let server = bind_server().await;
    let client = connect_client(server.local_addr(), "/").await.unwrap();

    let Err(ClientError::Rpc(error)) = client.call("missing", None).await else {
        panic!("expected an rpc error");
    };
    assert_eq!(error.code, -32601);
    assert_eq!(error.message, "Method not found");
    server.close().await;
}

#[tokio::test]
async fn list_methods_round_trip() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("alpha", |_, _| async move { Ok(Value::Null) })
        .await;
    server
        .register_fn("beta", |_, _| async move { Ok(Value::Null) })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    let methods = client.list_methods().await.unwrap();
    assert_eq!(methods, vec!["__listMethods", "alpha", "beta"]);
    server.close().await;
}

#[tokio::test]
async fn reply_timeout_when_the_handler_stalls() {
    init_tracing();
    let server = bind_server().await;
    server
        .register_fn("stall", |_, _| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        })
        .await;

    let client = connect_client(server.local_addr(), "/").await.unwrap();
    let outcome = client
        .call_with_timeout("stall", None, Duration::from_millis(100))
        .await;
    assert!(matches!(outcome, Err(ClientError::ReplyTimeout)));

    // The connection survives; other calls still work.
    let methods = client.list_methods().await.unwrap();
    assert!(methods.contains(&"stall".to_string()));
    server.close().await;
}

#[tokio::test]
async fn batch_mixes_success_and_error() {
    init_tracing();
    let server = bind_server().await;
    let mut socket = raw_socket(server.local_addr(), "/").await;

    let reply = raw_request(
        &mut socket,
        r#"[{"jsonrpc":"2.0","method":"__listMethods","id":1},
           {"jsonrpc":"1.0","method":"nope","id":2},
           {"jsonrpc":"2.0","method":"nope"}]"#,
    )
    .await;

    let items = reply.as_array().expect("batch reply should be an array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], 1);
    assert_eq!(items[0]["result"], json!(["__listMethods"]));
    assert_eq!(items[1]["id"], 2);
    assert_eq!(items[1]["error"]["code"], -32600);
    assert_eq!(items[1]["error"]["data"], "Invalid JSON RPC version");
    server.close().await;
}

#[tokio::test]
async fn empty_batch_is_a_single_error() {
    init_tracing();
    let server = bind_server().await;
    let mut socket = raw_socket(server.local_addr(), "/").await;

    let reply = raw_request(&mut socket, "[]").await;
    assert!(!reply.is_array());
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["error"]["data"], "Invalid array");
    assert_eq!(reply["id"], Value::Null);
    server.close().await;
}

#[tokio::test]
async fn malformed_frames_get_parse_errors_without_killing_the_connection() {
    init_tracing();
    let server = bind_server().await;
    let mut socket = raw_socket(server.local_addr(), "/").await;

    let reply = raw_request(&mut socket, "{not json").await;
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["error"]["message"], "Parse error");
    assert!(reply["error"]["data"].is_string());
    assert_eq!(reply["id"], Value::Null);

    // Same socket, next frame dispatches normally.
    let reply = raw_request(
        &mut socket,
        r#"{"jsonrpc":"2.0","method":"__listMethods","id":7}"#,
    )
    .await;
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["result"], json!(["__listMethods"]));
    server.close().await;
}

#[tokio::test]
async fn dispatch_validation_codes_over_the_wire() {
    init_tracing();
    let server = bind_server().await;
    let mut socket = raw_socket(server.local_addr(), "/").await;

    let reply = raw_request(&mut socket, r#""just a string""#).await;
    assert_eq!(reply["error"]["code"], -32600);

    let reply = raw_request(&mut socket, r#"{"jsonrpc":"2.0","id":3}"#).await;
    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(reply["error"]["data"], "Method not specified");

    let reply = raw_request(&mut socket, r#"{"jsonrpc":"2.0","method":17,"id":4}"#).await;
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["error"]["data"], "Invalid method name");

    let reply = raw_request(
        &mut socket,
        r#"{"jsonrpc":"2.0","method":"x","params":"scalar","id":5}"#,
    )
    .await;
    assert_eq!(reply["error"]["code"], -32600);
    assert!(reply["error"].get("data").is_none());
    server.close().await;
}
