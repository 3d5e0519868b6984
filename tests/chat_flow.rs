//! End-to-end tests: a real listener, real WebSocket clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chatroom::{serve, AppState, ChatConfig, Nickname, RoomHandle, SharedConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: String,
    room: RoomHandle,
    config: SharedConfig,
}

impl TestServer {
    /// Connect and read the welcome; the member is entered once it arrives
    async fn join(&self, nickname: &str) -> Client {
        let mut client = connect(&self.addr, nickname).await;
        assert_eq!(next_json(&mut client).await["kind"], "welcome");
        client
    }

    /// Poll until nobody holds or has reserved `nickname`
    async fn wait_until_free(&self, nickname: &str) {
        let nickname = Nickname::parse(nickname).unwrap();
        for _ in 0..100 {
            if self.room.can_admit(&nickname).await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{nickname} was never released");
    }
}

/// Start a server on an ephemeral port
async fn start_server(sensitive: &[&str]) -> TestServer {
    start_server_with(ChatConfig {
        sensitive: sensitive.iter().map(|w| w.to_string()).collect(),
        ..ChatConfig::default()
    })
    .await
}

/// Start a server with an unvalidated configuration
async fn start_server_with(config: ChatConfig) -> TestServer {
    let config = SharedConfig::new(config);
    let room = RoomHandle::spawn(64);
    let state = AppState::new(room.clone(), config.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(serve(listener, state));
    TestServer { addr, room, config }
}

async fn connect(addr: &str, nickname: &str) -> Client {
    let url = format!("ws://{}/ws?token=secret&nickname={}", addr, nickname);
    let (client, _) = connect_async(url).await.unwrap();
    client
}

/// Next JSON envelope, skipping control frames
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Next close frame code, skipping anything else
async fn next_close(client: &mut Client) -> Option<CloseCode> {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}

#[tokio::test]
async fn test_welcome_and_join_notice() {
    let server = start_server(&[]).await;

    let mut alice = connect(&server.addr, "alice").await;
    let welcome = next_json(&mut alice).await;
    assert_eq!(welcome["kind"], "welcome");
    assert_eq!(welcome["user"]["nickname"], "alice");
    assert_eq!(welcome["users"], serde_json::json!([]));
    // The token is never echoed back
    assert!(!welcome.to_string().contains("secret"));

    let mut bob = connect(&server.addr, "bobby").await;
    let welcome = next_json(&mut bob).await;
    assert_eq!(welcome["users"], serde_json::json!(["alice"]));

    let entered = next_json(&mut alice).await;
    assert_eq!(entered["kind"], "user_entered");
    assert_eq!(entered["user"]["nickname"], "bobby");
}

#[tokio::test]
async fn test_duplicate_nickname_rejected() {
    let server = start_server(&[]).await;
    let mut first = server.join("alice").await;

    let mut second = connect(&server.addr, "alice").await;
    let error = next_json(&mut second).await;
    assert_eq!(error["kind"], "error");
    assert_eq!(error["code"], "nickname_taken");
    assert_eq!(next_close(&mut second).await, Some(CloseCode::Unsupported));

    // The first alice is unaffected
    assert_eq!(server.room.members().await.unwrap(), vec!["alice"]);
    let mut bob = server.join("bobby").await;
    bob.send(Message::Text("still there?".into())).await.unwrap();
    assert_eq!(next_json(&mut first).await["kind"], "user_entered");
    let chat = next_json(&mut first).await;
    assert_eq!(chat["content"], "still there?");
}

#[tokio::test]
async fn test_invalid_nickname_rejected() {
    let server = start_server(&[]).await;

    let mut client = connect(&server.addr, "abc").await;
    let error = next_json(&mut client).await;
    assert_eq!(error["kind"], "error");
    assert_eq!(error["code"], "invalid_nickname");
    assert_eq!(next_close(&mut client).await, Some(CloseCode::Unsupported));
    assert!(server.room.members().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_path_refused() {
    let server = start_server(&[]).await;
    let url = format!("ws://{}/chat?nickname=alice", server.addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn test_chat_is_filtered_and_sender_excluded() {
    let server = start_server(&["spam"]).await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bobby").await;
    assert_eq!(next_json(&mut alice).await["kind"], "user_entered");

    bob.send(Message::Text("spam and eggs @alice".into()))
        .await
        .unwrap();
    let chat = next_json(&mut alice).await;
    assert_eq!(chat["kind"], "chat");
    assert_eq!(chat["user"]["nickname"], "bobby");
    assert_eq!(chat["content"], "**** and eggs @alice");
    assert_eq!(chat["ats"], serde_json::json!(["alice"]));

    // Reload: later messages use the new list
    server.config.replace(ChatConfig {
        sensitive: vec!["spam".into(), "eggs".into()],
        ..ChatConfig::default()
    });
    bob.send(Message::Text("spam and eggs".into())).await.unwrap();
    let chat = next_json(&mut alice).await;
    assert_eq!(chat["content"], "**** and ****");

    // Bob never sees his own messages: the next thing he gets is alice's
    alice.send(Message::Text("hi bob".into())).await.unwrap();
    let chat = next_json(&mut bob).await;
    assert_eq!(chat["user"]["nickname"], "alice");
    assert_eq!(chat["content"], "hi bob");
}

#[tokio::test]
async fn test_leave_notice_and_name_reuse() {
    let server = start_server(&[]).await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bobby").await;
    next_json(&mut alice).await;

    bob.close(None).await.unwrap();
    let left = next_json(&mut alice).await;
    assert_eq!(left["kind"], "user_left");
    assert_eq!(left["user"]["nickname"], "bobby");

    // The nickname is free again once the leave has been processed
    let mut again = connect(&server.addr, "bobby").await;
    let welcome = next_json(&mut again).await;
    assert_eq!(welcome["kind"], "welcome");
    assert_eq!(welcome["users"], serde_json::json!(["alice"]));
}

#[tokio::test]
async fn test_simultaneous_same_nickname() {
    let server = start_server(&[]).await;

    let (mut first, mut second) = tokio::join!(
        connect(&server.addr, "alice"),
        connect(&server.addr, "alice")
    );
    let (a, b) = tokio::join!(next_json(&mut first), next_json(&mut second));

    let (welcome, error, loser) = if a["kind"] == "welcome" {
        (a, b, &mut second)
    } else {
        (b, a, &mut first)
    };
    assert_eq!(welcome["kind"], "welcome");
    assert_eq!(error["kind"], "error");
    assert_eq!(error["code"], "nickname_taken");
    assert_eq!(next_close(loser).await, Some(CloseCode::Unsupported));
    assert_eq!(server.room.members().await.unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn test_blank_and_binary_frames_ignored() {
    let server = start_server(&[]).await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bobby").await;
    assert_eq!(next_json(&mut alice).await["kind"], "user_entered");

    bob.send(Message::Text("   \t ".into())).await.unwrap();
    bob.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    bob.send(Message::Text("real one".into())).await.unwrap();

    let chat = next_json(&mut alice).await;
    assert_eq!(chat["kind"], "chat");
    assert_eq!(chat["content"], "real one");
}

#[tokio::test]
async fn test_clean_close_is_normal() {
    let server = start_server(&[]).await;
    let mut alice = server.join("alice").await;

    alice
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    assert_eq!(next_close(&mut alice).await, Some(CloseCode::Normal));
    server.wait_until_free("alice").await;
}

#[tokio::test]
async fn test_dropped_connection_leaves() {
    let server = start_server(&[]).await;
    let mut alice = server.join("alice").await;
    let bob = server.join("bobby").await;
    assert_eq!(next_json(&mut alice).await["kind"], "user_entered");

    // No closing handshake: the server's read fails
    drop(bob);
    let left = next_json(&mut alice).await;
    assert_eq!(left["kind"], "user_left");
    assert_eq!(left["user"]["nickname"], "bobby");

    server.wait_until_free("bobby").await;
    server.join("bobby").await;
}

#[tokio::test]
async fn test_protocol_error_closes_with_1011() {
    let server = start_server(&[]).await;
    let (mut stream, mut received) = raw_upgrade(&server.addr, "alice").await;

    // Clients must mask their frames; an unmasked one is a read error
    stream.write_all(&[0x81, 0x02, b'h', b'i']).await.unwrap();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut received))
        .await
        .expect("server never hung up")
        .ok();

    let frames = server_frames(&received);
    assert_eq!(frames.first().map(|(opcode, _)| *opcode), Some(0x1));
    let (_, close) = frames
        .iter()
        .find(|(opcode, _)| *opcode == 0x8)
        .expect("no close frame");
    assert_eq!(u16::from_be_bytes([close[0], close[1]]), 1011);
    assert_eq!(&close[2..], b"read from client error");
    server.wait_until_free("alice").await;
}

#[tokio::test]
async fn test_oversized_mailbox_releases_nickname() {
    // Bypasses ChatConfig::parse, which would refuse this capacity
    let server = start_server_with(ChatConfig {
        message_queue: usize::MAX,
        ..ChatConfig::default()
    })
    .await;

    let (mut alice, _) = connect_async(format!("ws://{}/ws?nickname=alice", server.addr))
        .await
        .unwrap();
    assert_eq!(next_close(&mut alice).await, None);
    server.wait_until_free("alice").await;

    server.config.replace(ChatConfig::default());
    server.join("alice").await;
    assert_eq!(server.room.members().await.unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn test_malformed_query_refused() {
    let server = start_server(&[]).await;
    let url = format!("ws://{}/ws?nickname=alice&nickname=bobby", server.addr);
    assert!(connect_async(url).await.is_err());
    assert!(server.room.members().await.unwrap().is_empty());
}

/// Upgrade a plain TCP stream by hand; returns bytes read past the headers
async fn raw_upgrade(addr: &str, nickname: &str) -> (TcpStream, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws?nickname={nickname} HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(TIMEOUT, stream.read(&mut chunk))
            .await
            .expect("timed out waiting for upgrade")
            .unwrap();
        assert!(n > 0, "connection closed during upgrade");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            assert!(buf.starts_with(b"HTTP/1.1 101"));
            return (stream, buf.split_off(end + 4));
        }
    }
}

/// Split unmasked server frames into (opcode, payload)
fn server_frames(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut frames = Vec::new();
    while bytes.len() >= 2 {
        let opcode = bytes[0] & 0x0f;
        let (len, header) = match bytes[1] & 0x7f {
            126 => (u16::from_be_bytes([bytes[2], bytes[3]]) as usize, 4),
            127 => (
                u64::from_be_bytes(bytes[2..10].try_into().unwrap()) as usize,
                10,
            ),
            len => (len as usize, 2),
        };
        if bytes.len() < header + len {
            break;
        }
        frames.push((opcode, bytes[header..header + len].to_vec()));
        bytes = &bytes[header + len..];
    }
    frames
}
