//! Request/response calls against the room's REST surface.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use reqwest::{
    Body, Client, Response,
    multipart::{Form, Part},
};
use roomshare_core::{
    ChatMessage, CoreError, FileList, RemoteFile, RoomSummary, SendChatRequest,
    SendChatResponse, UploadReceipt, links,
};
use serde::de::DeserializeOwned;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;

pub const ROOM_INFO_PATH: &str = "/api/room-info";
pub const FILES_PATH: &str = "/api/files";
pub const UPLOAD_PATH: &str = "/api/upload";
pub const DELETE_PATH: &str = "/api/delete/";
pub const CHAT_SEND_PATH: &str = "/api/chat/send";

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;
const MAX_FILE_NAME_LEN: usize = 128;
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: u64,
}

#[async_trait]
pub trait RoomApi: Send + Sync {
    async fn room_info(&self) -> Result<RoomSummary, ClientError>;

    async fn list_files(&self) -> Result<Vec<RemoteFile>, ClientError>;

    /// Streams `path` as a single multipart `file` field, reporting bytes
    /// handed to the transport on `progress`.
    async fn upload_file(
        &self,
        path: &Path,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<UploadReceipt, ClientError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), ClientError>;

    /// Plain HTTP chat send, used while the live connection is down.
    async fn send_chat(&self, message: &str) -> Result<ChatMessage, ClientError>;

    async fn download_file(&self, file: &RemoteFile, dest_dir: &Path)
    -> Result<PathBuf, ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpRoomApi {
    http: Client,
    origin: Url,
}

impl HttpRoomApi {
    pub fn new(origin: Url) -> Self {
        Self {
            http: Client::new(),
            origin,
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.origin.join(path).map_err(CoreError::from)?)
    }

    fn delete_url(&self, file_id: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint(DELETE_PATH)?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ClientError::Config(format!("{} cannot be used as a base url", self.origin))
            })?;
            segments.pop_if_empty().push(file_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl RoomApi for HttpRoomApi {
    async fn room_info(&self) -> Result<RoomSummary, ClientError> {
        let response = self.http.get(self.endpoint(ROOM_INFO_PATH)?).send().await?;
        read_json(check_status("GET", ROOM_INFO_PATH, response)?).await
    }

    async fn list_files(&self) -> Result<Vec<RemoteFile>, ClientError> {
        let response = self.http.get(self.endpoint(FILES_PATH)?).send().await?;
        let list: FileList = read_json(check_status("GET", FILES_PATH, response)?).await?;
        Ok(list.files)
    }

    async fn upload_file(
        &self,
        path: &Path,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<UploadReceipt, ClientError> {
        let file = File::open(path).await?;
        let total = file.metadata().await?.len();
        let file_name = upload_file_name(path);
        debug!(path = %path.display(), total, "upload starting");

        let body = Body::wrap_stream(progress_stream(file, total, progress));
        let form = Form::new().part(
            "file",
            Part::stream_with_length(body, total).file_name(file_name),
        );
        let response = self
            .http
            .post(self.endpoint(UPLOAD_PATH)?)
            .multipart(form)
            .send()
            .await?;
        read_json(check_status("POST", UPLOAD_PATH, response)?).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ClientError> {
        let url = self.delete_url(file_id)?;
        let path = url.path().to_owned();
        let response = self.http.delete(url).send().await?;
        check_status("DELETE", &path, response)?;
        info!(file_id, "file deleted");
        Ok(())
    }

    async fn send_chat(&self, message: &str) -> Result<ChatMessage, ClientError> {
        let response = self
            .http
            .post(self.endpoint(CHAT_SEND_PATH)?)
            .json(&SendChatRequest {
                message: message.to_owned(),
            })
            .send()
            .await?;
        let sent: SendChatResponse =
            read_json(check_status("POST", CHAT_SEND_PATH, response)?).await?;
        Ok(sent.message)
    }

    async fn download_file(
        &self,
        file: &RemoteFile,
        dest_dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let url = links::download_link(&self.origin, file)?;
        let response = self.http.get(url).send().await?;
        let response = check_status("GET", &file.download_path, response)?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let file_name = sanitize_file_name(&file.name);
        let partial = dest_dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));
        if let Err(err) = write_body(response, &partial).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!(path = %partial.display(), "could not remove partial download: {cleanup}");
            }
            return Err(err);
        }

        let dest = unique_destination(dest_dir, &file_name);
        tokio::fs::rename(&partial, &dest).await?;
        info!(file_id = %file.id, dest = %dest.display(), "download finished");
        Ok(dest)
    }
}

async fn write_body(response: Response, path: &Path) -> Result<(), ClientError> {
    let mut out = File::create(path).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        out.write_all(&chunk?).await?;
    }
    out.flush().await?;
    Ok(())
}

fn check_status(
    method: &'static str,
    path: &str,
    response: Response,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            method,
            path: path.to_owned(),
            status: status.as_u16(),
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))
}

fn progress_stream(
    file: File,
    total: u64,
    progress: mpsc::UnboundedSender<TransferProgress>,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    stream::try_unfold(
        (file, 0_u64, progress),
        move |(mut file, sent, progress)| async move {
            let mut chunk = vec![0_u8; UPLOAD_CHUNK_BYTES];
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            chunk.truncate(read);
            let sent = sent.saturating_add(read as u64);
            let _ = progress.send(TransferProgress { sent, total });
            Ok(Some((chunk, (file, sent, progress))))
        },
    )
}

fn upload_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_owned())
}

pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "file.bin".to_owned();
    }
    let mut out: String = trimmed
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    if out.len() > MAX_FILE_NAME_LEN {
        let mut cut = MAX_FILE_NAME_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let dest = dir.join(file_name);
    if !dest.exists() {
        return dest;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = name.extension().and_then(|s| s.to_str());
    for i in 1..=200 {
        let candidate = match ext {
            Some(ext) => dir.join(format!("{stem} ({i}).{ext}")),
            None => dir.join(format!("{stem} ({i})")),
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    dest
}
