pub mod api;
pub mod app;
pub mod config;
pub mod connection;
pub mod error;
pub mod notify;
pub mod transport;

pub use api::{HttpRoomApi, RoomApi, TransferProgress};
pub use app::{App, AppCommand, AppEvent, Frontend, Render};
pub use config::{ClientArgs, ClientConfig};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, run_connection_driver};
pub use error::{ClientError, FailureKind};
pub use notify::{Notification, NotificationKind, NotificationPhase, NotificationSink};
pub use transport::{Link, Transport, WsTransport};
