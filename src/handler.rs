//! WebSocket connection handler
//!
//! Runs the admission sequence for one connection, then two tasks until
//! the transport closes:
//! - a send loop draining the connection's mailbox to the socket
//! - a receive loop filtering peer text and broadcasting it to the room
//!
//! Whichever loop stops first ends the session; the room is left exactly
//! once afterwards.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::filter::mentions;
use crate::handshake::{AdmissionRequest, WS_PATH};
use crate::member::Member;
use crate::message::{ServerMessage, UserInfo};
use crate::state::AppState;
use crate::types::{Nickname, SessionId};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Handle a new TCP connection
///
/// Returns an error only if the WebSocket handshake fails; everything
/// after that is reported to the peer and logged here.
pub async fn handle_connection(stream: TcpStream, state: AppState) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // 1. WebSocket handshake, capturing the admission parameters
    let mut admission = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() != WS_PATH {
            return Err(refuse(StatusCode::NOT_FOUND, "not found"));
        }
        match AdmissionRequest::from_query(request.uri().query()) {
            Ok(parsed) => {
                admission = Some(parsed);
                Ok(response)
            }
            Err(e) => {
                debug!("Malformed upgrade query: {}", e);
                Err(refuse(StatusCode::BAD_REQUEST, "malformed query"))
            }
        }
    };
    let mut ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let AdmissionRequest { token, nickname } = admission.unwrap_or_default();

    // 2. Nickname length
    let nickname = match Nickname::parse(&nickname) {
        Ok(nickname) => nickname,
        Err(e) => {
            warn!("Rejecting {}: {}", peer_addr, e);
            reject(&mut ws_stream, &e).await;
            return Ok(());
        }
    };

    // 3. Nickname uniqueness (reserved until enter or leave)
    let session_id = SessionId::new();
    if !state.room.reserve(session_id, &nickname).await? {
        let e = AppError::NicknameTaken(nickname.to_string());
        warn!("Rejecting {}: {}", peer_addr, e);
        reject(&mut ws_stream, &e).await;
        return Ok(());
    }

    // 4-7 run in their own task so the name is released even if it dies
    let user = UserInfo::new(session_id, nickname.clone());
    let session = tokio::spawn(run_session(
        ws_stream,
        state.clone(),
        user.clone(),
        token,
        peer_addr,
    ));
    if let Err(e) = session.await {
        error!("Session of {} aborted: {}", nickname, e);
        // Our reservation or membership is the only possible holder
        let entered = state
            .room
            .members()
            .await
            .map(|names| names.iter().any(|n| n == nickname.as_str()))
            .unwrap_or(false);
        if let Err(e) = state.room.leave(session_id, &nickname).await {
            debug!("Leave for {} not delivered: {}", nickname, e);
        }
        if entered {
            let _ = state.room.broadcast(ServerMessage::user_left(&user)).await;
        }
    }

    Ok(())
}

/// Mailbox, enter, relay, leave, close
async fn run_session(
    ws_stream: WsStream,
    state: AppState,
    user: UserInfo,
    token: String,
    peer_addr: String,
) {
    let nickname = &user.nickname;
    let capacity = state.config.snapshot().message_queue;
    let (mailbox, mailbox_rx) = mpsc::channel(capacity);
    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let mut send_task = tokio::spawn(send_loop(ws_sender, mailbox_rx, nickname.clone()));

    let member = Member::new(user.id, nickname.clone(), mailbox);
    let admitted = admit(&state, &user, member, token).await;

    // 5-6. Relay until the transport closes
    let mut send_done = false;
    let mut sink = None;
    let read_result = match &admitted {
        Ok(()) => {
            info!("{} joined from {}", nickname, peer_addr);
            tokio::select! {
                result = receive_loop(&mut ws_receiver, &user, &state) => result,
                joined = &mut send_task => {
                    send_done = true;
                    match flatten(joined) {
                        Ok(ws_sender) => {
                            sink = Some(ws_sender);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        }
        Err(e) => {
            error!("Admission of {} failed: {}", nickname, e);
            Ok(())
        }
    };

    // 7. Leave exactly once, then tell the others
    if let Err(e) = state.room.leave(user.id, nickname).await {
        debug!("Leave for {} not delivered: {}", nickname, e);
    }
    if admitted.is_ok() {
        let _ = state.room.broadcast(ServerMessage::user_left(&user)).await;
        info!("{} left", nickname);
    }

    // The send loop ends once the room has dropped its mailbox sender
    if !send_done {
        sink = flatten(send_task.await).ok();
    }

    if let Err(e) = &read_result {
        warn!("Session of {} ended with error: {}", nickname, e);
    }
    if let Some(mut sink) = sink {
        // Fails harmlessly if the peer already closed
        let _ = sink.send(Message::Close(Some(close_frame(&read_result)))).await;
        let _ = sink.close().await;
    }
}

/// Steps 4-5 of admission: token discard, welcome + enter, announce
async fn admit(
    state: &AppState,
    user: &UserInfo,
    member: Member,
    token: String,
) -> Result<(), AppError> {
    debug!("Session {} token present: {}", user.id, !token.is_empty());
    drop(token);

    if !state.room.enter(member, user.clone()).await? {
        return Err(AppError::NicknameTaken(user.nickname.to_string()));
    }
    state
        .room
        .broadcast(ServerMessage::user_entered(user))
        .await
}

/// 1000 after a clean leave, 1011 after a transport error
fn close_frame(read_result: &Result<(), AppError>) -> CloseFrame<'static> {
    match read_result {
        Ok(()) => CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        },
        Err(_) => CloseFrame {
            code: CloseCode::Error,
            reason: "read from client error".into(),
        },
    }
}

fn refuse(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut rejection = ErrorResponse::new(Some(reason.to_string()));
    *rejection.status_mut() = status;
    rejection
}

/// Peer text → content filter → room
async fn receive_loop(
    ws_receiver: &mut WsSource,
    user: &UserInfo,
    state: &AppState,
) -> Result<(), AppError> {
    while let Some(frame) = ws_receiver.next().await {
        match frame? {
            Message::Text(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                let content = state.filter.filter(&text);
                let ats = mentions(&content);
                state
                    .room
                    .broadcast(ServerMessage::chat(user, content, ats))
                    .await?;
            }
            Message::Close(_) => {
                debug!("{} sent close frame", user.nickname);
                return Ok(());
            }
            Message::Binary(_) => {
                debug!("Ignoring binary frame from {}", user.nickname);
            }
            // Ping/Pong are answered by tungstenite
            _ => {}
        }
    }
    Ok(())
}

/// Mailbox → socket
///
/// Returns the sink once the mailbox is closed, so the handler can send
/// the close frame; returns an error as soon as a write fails.
async fn send_loop(
    mut ws_sender: WsSink,
    mut mailbox: mpsc::Receiver<ServerMessage>,
    nickname: Nickname,
) -> Result<WsSink, AppError> {
    while let Some(msg) = mailbox.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                    debug!("Write to {} failed, ending send loop", nickname);
                    return Err(e.into());
                }
            }
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                // Continue - don't break on serialization errors
            }
        }
    }
    debug!("Send loop ended for {}", nickname);
    Ok(ws_sender)
}

fn flatten(joined: Result<Result<WsSink, AppError>, JoinError>) -> Result<WsSink, AppError> {
    joined.map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

/// Report an admission error to the peer and close with 1003
async fn reject(ws_stream: &mut WsStream, err: &AppError) {
    let reason = match err {
        AppError::InvalidNickname(_) => "nickname illegal!",
        AppError::NicknameTaken(_) => "nickname exists!",
        _ => "admission failed",
    };
    if let Err(e) = send_json(ws_stream, &ServerMessage::from(err)).await {
        debug!("Failed to send admission error: {}", e);
    }
    let frame = CloseFrame {
        code: CloseCode::Unsupported,
        reason: reason.into(),
    };
    let _ = ws_stream.close(Some(frame)).await;
}

async fn send_json<S>(sink: &mut S, msg: &ServerMessage) -> Result<(), AppError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
