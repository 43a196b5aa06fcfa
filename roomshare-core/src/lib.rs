use thiserror::Error;

pub mod catalog;
pub mod format;
pub mod links;
pub mod messages;
pub mod protocol;
pub mod upload;

pub use catalog::{CatalogEntry, CatalogView, FileCatalog};
pub use messages::{HistoryUpdate, LatestView, MessageStore};
pub use protocol::{
    ChatMessage, ClientEvent, FileList, RemoteFile, RoomSummary, SendChatRequest,
    SendChatResponse, ServerEvent, UploadReceipt, Welcome, decode_server_event,
    encode_client_event,
};
pub use upload::{JobId, TransferRate, UploadJob, UploadJobTracker, UploadStatus};

pub const MAX_CHAT_HISTORY: usize = 100;
pub const WS_PATH: &str = "/ws";

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("unknown upload job {0}")]
    UnknownJob(JobId),
    #[error("upload job {0} already finished")]
    JobFinished(JobId),
    #[error("progress for {job} went backwards: reported {reported}, already at {current}")]
    ProgressRegressed {
        job: JobId,
        reported: u64,
        current: u64,
    },
    #[error("progress for {job} would lower the percentage: {reported} of {total} bytes")]
    PercentRegressed {
        job: JobId,
        reported: u64,
        total: u64,
    },
}
