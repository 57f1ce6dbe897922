//! End-to-end scenarios driven over a real WebSocket against a live
//! `supervisor::run` instance, following the corpus's `tokio-tungstenite`
//! test-client style (see the other_examples S2S/gateway manifests).

use std::net::SocketAddr;
use std::time::Duration;

use ed25519_dalek::{Signer, SigningKey};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use overlay_hub::config::HubConfig;
use overlay_hub::envelope::canonicalize;

async fn spawn_hub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let db_path = std::env::temp_dir().join(format!(
        "overlay_hub_test_{}_{}.db",
        std::process::id(),
        addr.port()
    ));
    let _ = std::fs::remove_file(&db_path);

    let mut config = HubConfig::from_env();
    config.port = addr.port();
    config.bind_addr = "127.0.0.1".to_string();
    config.db_path = db_path.to_string_lossy().to_string();

    tokio::spawn(async move {
        let _ = overlay_hub::supervisor::run(config).await;
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    addr
}

async fn connect(addr: SocketAddr, public_key_b64: &str) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://{addr}/ws");
    let mut request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(url)
        .header("X-Client-ID", public_key_b64)
        .header("Host", addr.to_string())
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tokio_tungstenite::tungstenite::handshake::client::generate_key(),
        )
        .body(())
        .unwrap();
    let (stream, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    stream
}

fn new_identity() -> (SigningKey, String) {
    use base64::Engine;
    let mut rng = rand::rngs::OsRng;
    let key = SigningKey::generate(&mut rng);
    let b64 = base64::engine::general_purpose::STANDARD.encode(key.verifying_key().to_bytes());
    (key, b64)
}

async fn send(ws: &mut tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>, kind: &str, payload: Value) {
    let envelope = json!({
        "message_id": uuid_like(),
        "type": kind,
        "payload": payload,
    });
    ws.send(Message::Text(envelope.to_string())).await.unwrap();
}

async fn recv(ws: &mut tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn uuid_like() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[tokio::test]
async fn create_join_and_signal_relay() {
    let addr = spawn_hub().await;

    let (_owner_key, owner_b64) = new_identity();
    let mut owner_ws = connect(addr, &owner_b64).await;

    send(
        &mut owner_ws,
        "CreateNetwork",
        json!({
            "publicKey": owner_b64,
            "networkName": "office",
            "pin": "1234",
            "computerName": "owner-pc",
        }),
    )
    .await;
    let created = recv(&mut owner_ws).await;
    assert_eq!(created["type"], "NetworkCreated");
    let network_id = created["payload"]["networkId"].as_str().unwrap().to_string();

    let (_joiner_key, joiner_b64) = new_identity();
    let mut joiner_ws = connect(addr, &joiner_b64).await;
    send(
        &mut joiner_ws,
        "JoinNetwork",
        json!({
            "publicKey": joiner_b64,
            "networkId": network_id,
            "pin": "1234",
            "computerName": "joiner-pc",
        }),
    )
    .await;
    let joined = recv(&mut joiner_ws).await;
    assert_eq!(joined["type"], "NetworkJoined");

    let notification = recv(&mut owner_ws).await;
    assert_eq!(notification["type"], "ComputerJoined");

    send(
        &mut joiner_ws,
        "SdpOffer",
        json!({
            "networkId": network_id,
            "targetPublicKey": owner_b64,
            "body": { "sdp": "v=0..." },
        }),
    )
    .await;
    let relayed = recv(&mut owner_ws).await;
    assert_eq!(relayed["type"], "SdpOffer");
    assert_eq!(relayed["payload"]["fromPublicKey"], joiner_b64);
}

#[tokio::test]
async fn rename_requires_owner_signature() {
    let addr = spawn_hub().await;

    let (owner_key, owner_b64) = new_identity();
    let mut owner_ws = connect(addr, &owner_b64).await;

    send(
        &mut owner_ws,
        "CreateNetwork",
        json!({
            "publicKey": owner_b64,
            "networkName": "office",
            "pin": "1234",
            "computerName": "owner-pc",
        }),
    )
    .await;
    let created = recv(&mut owner_ws).await;
    let network_id = created["payload"]["networkId"].as_str().unwrap().to_string();

    let mut payload = json!({
        "networkId": network_id,
        "newName": "new-name",
    });
    let canonical = canonicalize(&payload).unwrap();
    let signature = owner_key.sign(&canonical);
    let sig_b64 = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    };
    payload["signature"] = json!(sig_b64);

    send(&mut owner_ws, "Rename", payload).await;
    let resp = recv(&mut owner_ws).await;
    assert_eq!(resp["type"], "RenameSuccess");
}

#[tokio::test]
async fn non_owner_rename_is_rejected() {
    let addr = spawn_hub().await;

    let (_owner_key, owner_b64) = new_identity();
    let mut owner_ws = connect(addr, &owner_b64).await;

    send(
        &mut owner_ws,
        "CreateNetwork",
        json!({
            "publicKey": owner_b64,
            "networkName": "office",
            "pin": "1234",
            "computerName": "owner-pc",
        }),
    )
    .await;
    let created = recv(&mut owner_ws).await;
    let network_id = created["payload"]["networkId"].as_str().unwrap().to_string();

    let (joiner_key, joiner_b64) = new_identity();
    let mut joiner_ws = connect(addr, &joiner_b64).await;
    send(
        &mut joiner_ws,
        "JoinNetwork",
        json!({
            "publicKey": joiner_b64,
            "networkId": network_id,
            "pin": "1234",
            "computerName": "joiner-pc",
        }),
    )
    .await;
    let _joined = recv(&mut joiner_ws).await;
    let _notification = recv(&mut owner_ws).await;

    let mut payload = json!({
        "networkId": network_id,
        "newName": "hijacked",
    });
    let canonical = canonicalize(&payload).unwrap();
    let signature = joiner_key.sign(&canonical);
    let sig_b64 = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    };
    payload["signature"] = json!(sig_b64);

    send(&mut joiner_ws, "Rename", payload).await;
    let resp = recv(&mut joiner_ws).await;
    assert_eq!(resp["type"], "Error");
    assert_eq!(resp["payload"]["kind"], "AUTH");
}

#[tokio::test]
async fn owner_leaving_deletes_network_for_remaining_members() {
    let addr = spawn_hub().await;

    let (_owner_key, owner_b64) = new_identity();
    let mut owner_ws = connect(addr, &owner_b64).await;

    send(
        &mut owner_ws,
        "CreateNetwork",
        json!({
            "publicKey": owner_b64,
            "networkName": "office",
            "pin": "1234",
            "computerName": "owner-pc",
        }),
    )
    .await;
    let created = recv(&mut owner_ws).await;
    let network_id = created["payload"]["networkId"].as_str().unwrap().to_string();

    let (_joiner_key, joiner_b64) = new_identity();
    let mut joiner_ws = connect(addr, &joiner_b64).await;
    send(
        &mut joiner_ws,
        "JoinNetwork",
        json!({
            "publicKey": joiner_b64,
            "networkId": network_id,
            "pin": "1234",
            "computerName": "joiner-pc",
        }),
    )
    .await;
    let _joined = recv(&mut joiner_ws).await;
    let _computer_joined = recv(&mut owner_ws).await;

    send(
        &mut owner_ws,
        "LeaveNetwork",
        json!({ "networkId": network_id }),
    )
    .await;
    let resp = recv(&mut owner_ws).await;
    assert_eq!(resp["type"], "LeaveNetwork");

    let mut saw_computer_left = false;
    let mut saw_network_deleted = false;
    for _ in 0..2 {
        let notification = recv(&mut joiner_ws).await;
        match notification["type"].as_str().unwrap() {
            "ComputerLeft" => saw_computer_left = true,
            "NetworkDeleted" => saw_network_deleted = true,
            other => panic!("unexpected notification type {other}"),
        }
    }
    assert!(saw_computer_left && saw_network_deleted);
}
