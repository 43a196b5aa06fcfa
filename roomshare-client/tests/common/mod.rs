#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{
        Multipart, Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use roomshare_core::{
    ChatMessage, FileList, RemoteFile, RoomSummary, SendChatRequest, SendChatResponse,
    ServerEvent, UploadReceipt, Welcome,
};
use tokio::{net::TcpListener, sync::oneshot};
use url::Url;

#[derive(Default)]
pub struct RoomState {
    pub files: Mutex<Vec<(String, Vec<u8>)>>,
    pub chat: Mutex<Vec<ChatMessage>>,
    pub fail_uploads: AtomicBool,
    /// Close each live connection right after the welcome frame.
    pub drop_after_welcome: AtomicBool,
    /// Send half of each download body, then fail the stream.
    pub abort_downloads: AtomicBool,
    pub ws_connections: AtomicUsize,
}

impl RoomState {
    pub fn with_file(self, name: &str, data: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .push((name.to_owned(), data.to_vec()));
        self
    }

    pub fn with_chat(self, texts: &[&str]) -> Self {
        {
            let mut chat = self.chat.lock().unwrap();
            for text in texts {
                let next = chat.len();
                chat.push(chat_message(next, text, "Seed"));
            }
        }
        self
    }
}

pub struct RoomServer {
    pub origin: Url,
    pub state: Arc<RoomState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Drop for RoomServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_room(state: RoomState) -> RoomServer {
    let state = Arc::new(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral room socket");
    let address = listener.local_addr().expect("room local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, router(Arc::clone(&state))).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    RoomServer {
        origin: Url::parse(&format!("http://{address}")).expect("room origin"),
        state,
        shutdown_tx: Some(shutdown_tx),
    }
}

fn router(state: Arc<RoomState>) -> Router {
    Router::new()
        .route("/api/room-info", get(room_info))
        .route("/api/files", get(list_files))
        .route("/api/upload", post(upload))
        .route("/api/delete/{file_id}", delete(delete_file))
        .route("/api/download/{file_id}", get(download))
        .route("/api/chat/send", post(send_chat))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub fn chat_message(index: usize, text: &str, sender: &str) -> ChatMessage {
    let timestamp = 1_735_000_000.0 + index as f64;
    ChatMessage {
        id: format!("msg-{index}"),
        message: text.to_owned(),
        client_name: sender.to_owned(),
        client_ip: "127.0.0.1".to_owned(),
        timestamp,
        time_str: "12:00:00".to_owned(),
    }
}

fn remote_file(name: &str, size: usize) -> RemoteFile {
    RemoteFile {
        id: name.to_owned(),
        name: name.to_owned(),
        size: size as u64,
        modified: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default(),
        download_path: format!("/api/download/{name}"),
    }
}

async fn room_info(State(state): State<Arc<RoomState>>) -> Json<RoomSummary> {
    Json(RoomSummary {
        qr_code_ref: "data:image/png;base64,AAAA".to_owned(),
        room_url: "http://192.168.1.20:8080".to_owned(),
        total_clients: state.ws_connections.load(Ordering::SeqCst) as u64,
        chat_message_count: state.chat.lock().unwrap().len() as u64,
        total_files: state.files.lock().unwrap().len() as u64,
    })
}

async fn list_files(State(state): State<Arc<RoomState>>) -> Json<FileList> {
    let files = state
        .files
        .lock()
        .unwrap()
        .iter()
        .map(|(name, data)| remote_file(name, data.len()))
        .collect();
    Json(FileList { files })
}

async fn upload(
    State(state): State<Arc<RoomState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, StatusCode> {
    let mut stored = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let is_file = field.name() == Some("file");
        let name = field.file_name().unwrap_or("upload.bin").to_owned();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        if is_file && stored.is_none() {
            stored = Some((name, data.to_vec()));
        }
    }

    // Body is fully read before rejecting so the client sees the status.
    if state.fail_uploads.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let (name, data) = stored.ok_or(StatusCode::BAD_REQUEST)?;
    let size = data.len() as u64;
    state.files.lock().unwrap().push((name.clone(), data));
    Ok(Json(UploadReceipt {
        success: true,
        url: Some(format!("/api/download/{name}")),
        filename: Some(name),
        size: Some(size),
    }))
}

async fn delete_file(
    State(state): State<Arc<RoomState>>,
    Path(file_id): Path<String>,
) -> StatusCode {
    let mut files = state.files.lock().unwrap();
    match files.iter().position(|(name, _)| *name == file_id) {
        Some(index) => {
            files.remove(index);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn download(
    State(state): State<Arc<RoomState>>,
    Path(file_id): Path<String>,
) -> Result<Response, StatusCode> {
    let data = state
        .files
        .lock()
        .unwrap()
        .iter()
        .find(|(name, _)| *name == file_id)
        .map(|(_, data)| data.clone())
        .ok_or(StatusCode::NOT_FOUND)?;

    if state.abort_downloads.load(Ordering::SeqCst) {
        let head = Bytes::copy_from_slice(&data[..data.len() / 2]);
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(head), Err(std::io::Error::other("connection reset mid-body"))];
        return Ok(Body::from_stream(futures::stream::iter(chunks)).into_response());
    }
    Ok(data.into_response())
}

async fn send_chat(
    State(state): State<Arc<RoomState>>,
    Json(request): Json<SendChatRequest>,
) -> Json<SendChatResponse> {
    let message = record_chat(&state, &request.message, "HttpUser");
    Json(SendChatResponse {
        success: true,
        message,
    })
}

fn record_chat(state: &RoomState, text: &str, sender: &str) -> ChatMessage {
    let mut chat = state.chat.lock().unwrap();
    let message = chat_message(chat.len(), text, sender);
    chat.push(message.clone());
    message
}

async fn ws_handler(
    State(state): State<Arc<RoomState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<RoomState>) {
    let connection = state.ws_connections.fetch_add(1, Ordering::SeqCst) + 1;
    let client_name = format!("User{connection}");

    let history = state.chat.lock().unwrap().clone();
    let welcome = ServerEvent::Welcome(Welcome {
        client_id: Some(format!("client-{connection}")),
        client_name: Some(client_name.clone()),
        chat_history: Some(history),
    });
    let frame = serde_json::to_string(&welcome).expect("encode welcome");
    if socket.send(Message::Text(frame.into())).await.is_err() {
        return;
    }
    if state.drop_after_welcome.load(Ordering::SeqCst) {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
            continue;
        };
        if value["type"] != "chat_message" {
            continue;
        }
        let Some(body) = value["message"].as_str() else {
            continue;
        };
        let message = record_chat(&state, body, &client_name);
        let echo = serde_json::to_string(&ServerEvent::ChatMessage { message })
            .expect("encode chat echo");
        if socket.send(Message::Text(echo.into())).await.is_err() {
            break;
        }
    }
}
