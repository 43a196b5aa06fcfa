//! Client controller. Owns all room state and is the only thing that
//! mutates it; network work runs on spawned tasks that report back as
//! [`AppEvent`]s on a single channel.

use std::{path::PathBuf, sync::Arc, time::Instant};

use roomshare_core::{
    CatalogView, ChatMessage, FileCatalog, HistoryUpdate, JobId, LatestView, MessageStore,
    RemoteFile, RoomSummary, UploadJob, UploadJobTracker, UploadReceipt, links,
};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    api::{RoomApi, TransferProgress},
    config::ClientConfig,
    connection::{
        ConnectionEffect, ConnectionEvent, ConnectionManager, ConnectionState,
        run_connection_driver,
    },
    error::{ClientError, FailureKind},
    notify::{EXIT_TRANSITION, Notification, NotificationKind, NotificationSink},
    transport::Transport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    SendChat(String),
    Upload(Vec<PathBuf>),
    Refresh,
    Delete(String),
    ToggleHistory,
    CopyLink(String),
    Download(String),
    Shutdown,
}

impl AppCommand {
    /// Parses one line of terminal input. Plain text is a chat message;
    /// `None` means the line was blank or an unrecognised command.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(AppCommand::SendChat(line.to_owned()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let with_arg = |build: fn(String) -> AppCommand| {
            (!arg.is_empty()).then(|| build(arg.to_owned()))
        };
        match name {
            "upload" => {
                let paths: Vec<PathBuf> = arg.split_whitespace().map(PathBuf::from).collect();
                (!paths.is_empty()).then_some(AppCommand::Upload(paths))
            }
            "files" | "refresh" => Some(AppCommand::Refresh),
            "delete" => with_arg(AppCommand::Delete),
            "history" => Some(AppCommand::ToggleHistory),
            "link" | "copy" => with_arg(AppCommand::CopyLink),
            "download" => with_arg(AppCommand::Download),
            "quit" | "exit" => Some(AppCommand::Shutdown),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum AppEvent {
    Connection(ConnectionEvent),
    RoomInfo(Result<RoomSummary, ClientError>),
    FilesLoaded(Result<Vec<RemoteFile>, ClientError>),
    UploadStarted(JobId),
    UploadProgress {
        job: JobId,
        progress: TransferProgress,
    },
    UploadFinished {
        job: JobId,
        result: Result<UploadReceipt, ClientError>,
    },
    Deleted {
        file_id: String,
        result: Result<(), ClientError>,
    },
    ChatSent(Result<ChatMessage, ClientError>),
    Downloaded(Result<PathBuf, ClientError>),
    RefreshTick,
    NotificationFading(u64),
    NotificationExpired(u64),
}

impl From<ConnectionEvent> for AppEvent {
    fn from(event: ConnectionEvent) -> Self {
        AppEvent::Connection(event)
    }
}

/// A view update handed to the frontend.
#[derive(Debug)]
pub enum Render<'a> {
    Connection(ConnectionState),
    Latest(&'a LatestView),
    History {
        update: HistoryUpdate,
        messages: &'a [ChatMessage],
    },
    Catalog(CatalogView<'a>),
    Room(&'a RoomSummary),
    Transfer(&'a UploadJob),
    Notification(Option<&'a Notification>),
}

pub trait Frontend {
    fn render(&mut self, update: Render<'_>);

    /// Blocking yes/no question. Returning false cancels the action.
    fn confirm(&mut self, prompt: &str) -> bool;

    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), String>;
}

pub struct App<F: Frontend> {
    config: ClientConfig,
    api: Arc<dyn RoomApi>,
    events: mpsc::UnboundedSender<AppEvent>,
    connection: ConnectionManager,
    store: MessageStore,
    uploads: UploadJobTracker,
    upload_slots: Arc<Semaphore>,
    catalog: FileCatalog,
    room: Option<RoomSummary>,
    notifications: NotificationSink,
    frontend: F,
}

impl<F: Frontend> App<F> {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn RoomApi>,
        frontend: F,
    ) -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            upload_slots: Arc::new(Semaphore::new(config.max_concurrent_uploads)),
            notifications: NotificationSink::new(config.notification_ttl),
            config,
            api,
            events,
            connection: ConnectionManager::new(),
            store: MessageStore::new(),
            uploads: UploadJobTracker::new(),
            catalog: FileCatalog::new(),
            room: None,
            frontend,
        };
        (app, events_rx)
    }

    /// Kicks off the room-info fetch, the live connection, the initial file
    /// listing and the periodic refresh, in that order.
    pub fn start(&mut self, transport: Arc<dyn Transport>) {
        self.load_room_info();

        match links::websocket_url(&self.config.origin) {
            Ok(url) => {
                tokio::spawn(run_connection_driver(
                    transport,
                    url,
                    self.config.reconnect_delay,
                    self.events.clone(),
                ));
            }
            Err(err) => {
                error!("cannot derive live connection url: {err}");
                self.notify(NotificationKind::Error, format!("live chat unavailable: {err}"));
            }
        }

        self.refresh_files();

        let events = self.events.clone();
        let period = self.config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if events.send(AppEvent::RefreshTick).is_err() {
                    break;
                }
            }
        });
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<AppEvent>,
        mut commands: mpsc::UnboundedReceiver<AppCommand>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(AppCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
        info!("client stopped");
    }

    pub fn handle_command(&mut self, command: AppCommand) {
        debug!(?command, "command");
        match command {
            AppCommand::SendChat(text) => self.send_chat(&text),
            AppCommand::Upload(paths) => self.enqueue_uploads(paths),
            AppCommand::Refresh => {
                self.refresh_files();
                self.notify(NotificationKind::Info, "refreshing file list");
            }
            AppCommand::Delete(file_id) => self.delete_file(file_id),
            AppCommand::ToggleHistory => {
                let update = self.store.toggle_history_visible();
                self.render_history(update);
            }
            AppCommand::CopyLink(file_id) => self.copy_link(&file_id),
            AppCommand::Download(file_id) => self.download(&file_id),
            AppCommand::Shutdown => {}
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Connection(event) => self.on_connection_event(event),
            AppEvent::RoomInfo(Ok(summary)) => {
                let summary = self.room.insert(summary);
                self.frontend.render(Render::Room(summary));
            }
            AppEvent::RoomInfo(Err(err)) => {
                self.report_failure("room info request", &err, "could not reach the room server");
            }
            AppEvent::FilesLoaded(Ok(files)) => {
                debug!(count = files.len(), "file list loaded");
                self.catalog.replace(files);
                self.render_catalog();
            }
            AppEvent::FilesLoaded(Err(err)) => {
                self.report_failure("file list request", &err, "failed to load the file list");
            }
            AppEvent::UploadStarted(job) => {
                if let Err(err) = self.uploads.mark_started(job, Instant::now()) {
                    debug!("ignoring start for {job}: {err}");
                }
            }
            AppEvent::UploadProgress { job, progress } => {
                match self
                    .uploads
                    .on_progress(job, progress.sent, progress.total, Instant::now())
                {
                    Ok(_) => {
                        if let Some(job) = self.uploads.get(job) {
                            self.frontend.render(Render::Transfer(job));
                        }
                    }
                    Err(err) => debug!("ignoring progress for {job}: {err}"),
                }
            }
            AppEvent::UploadFinished { job, result } => self.on_upload_finished(job, result),
            AppEvent::Deleted { file_id, result } => match result {
                Ok(()) => {
                    self.catalog.remove(&file_id);
                    self.render_catalog();
                    self.notify(NotificationKind::Success, "file deleted");
                    self.refresh_files();
                }
                Err(err) => {
                    self.report_failure(&format!("delete of {file_id}"), &err, "delete failed");
                }
            },
            AppEvent::ChatSent(Ok(message)) => {
                let update = self.store.append(message);
                self.render_latest();
                self.render_history(update);
            }
            AppEvent::ChatSent(Err(err)) => {
                self.report_failure("chat send", &err, "message not sent, please retry");
            }
            AppEvent::Downloaded(Ok(path)) => {
                self.notify(NotificationKind::Success, format!("saved to {}", path.display()));
            }
            AppEvent::Downloaded(Err(err)) => {
                self.report_failure("download", &err, "download failed");
            }
            AppEvent::RefreshTick => {
                self.refresh_files();
                self.load_room_info();
            }
            AppEvent::NotificationFading(id) => {
                if let Some(notification) = self.notifications.begin_exit(id) {
                    self.frontend.render(Render::Notification(Some(notification)));
                }
            }
            AppEvent::NotificationExpired(id) => {
                if self.notifications.expire(id) {
                    self.frontend.render(Render::Notification(None));
                }
            }
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        let failure = match &event {
            ConnectionEvent::Closed { reason } => Some(reason.clone()),
            _ => None,
        };

        match self.connection.apply(event, &mut self.store) {
            ConnectionEffect::State(state) => {
                self.frontend.render(Render::Connection(state));
                match state {
                    ConnectionState::Open => {
                        self.notify(NotificationKind::Success, "connected to the room");
                    }
                    ConnectionState::Closed => {
                        self.render_latest();
                        let text = match failure.flatten() {
                            Some(reason) => format!("connection failed ({reason}), retrying"),
                            None => "connection lost, reconnecting".to_owned(),
                        };
                        self.notify(NotificationKind::Error, text);
                    }
                    ConnectionState::Connecting => {}
                }
            }
            ConnectionEffect::Welcomed { history: Some(update) } => {
                self.render_latest();
                self.render_history(update);
            }
            ConnectionEffect::Welcomed { history: None } | ConnectionEffect::Ignored => {}
            ConnectionEffect::ChatAppended(update) => {
                self.render_latest();
                self.render_history(update);
            }
        }
    }

    fn send_chat(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            self.report_failure("chat send", &ClientError::EmptyMessage, "message not sent");
            return;
        }

        if self.connection.state() == ConnectionState::Open {
            match self.connection.send_chat(text, &mut self.store) {
                Ok(()) => {
                    self.render_latest();
                    return;
                }
                Err(err) => warn!("live send failed, falling back to http: {err}"),
            }
        }

        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let text = text.to_owned();
        tokio::spawn(async move {
            let result = api.send_chat(&text).await;
            let _ = events.send(AppEvent::ChatSent(result));
        });
    }

    fn enqueue_uploads(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            let size = match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => meta.len(),
                Ok(_) => {
                    self.notify(
                        NotificationKind::Error,
                        format!("{} is not a file", path.display()),
                    );
                    continue;
                }
                Err(err) => {
                    warn!(path = %path.display(), "cannot read upload source: {err}");
                    self.notify(
                        NotificationKind::Error,
                        format!("cannot read {}", path.display()),
                    );
                    continue;
                }
            };
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            let job = self.uploads.enqueue(name, size, Instant::now());
            info!(job = %job, path = %path.display(), size, "upload queued");

            let api = Arc::clone(&self.api);
            let events = self.events.clone();
            let slots = Arc::clone(&self.upload_slots);
            tokio::spawn(async move {
                let _permit = slots.acquire_owned().await.ok();
                let _ = events.send(AppEvent::UploadStarted(job));

                let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
                let forward = {
                    let events = events.clone();
                    tokio::spawn(async move {
                        while let Some(progress) = progress_rx.recv().await {
                            if events.send(AppEvent::UploadProgress { job, progress }).is_err() {
                                break;
                            }
                        }
                    })
                };
                let result = api.upload_file(&path, progress_tx).await;
                let _ = forward.await;
                let _ = events.send(AppEvent::UploadFinished { job, result });
            });
        }
        self.render_catalog();
    }

    fn on_upload_finished(&mut self, job: JobId, result: Result<UploadReceipt, ClientError>) {
        let success = result.is_ok();
        if let Err(err) = self.uploads.on_complete(job, success) {
            warn!("ignoring completion for {job}: {err}");
            return;
        }
        let name = self
            .uploads
            .get(job)
            .map(|job| job.file_name.clone())
            .unwrap_or_default();

        match result {
            Ok(receipt) => {
                info!(job = %job, stored_as = ?receipt.filename, "upload finished");
                self.render_catalog();
                self.notify(NotificationKind::Success, format!("{name} uploaded"));
                self.refresh_files();
            }
            Err(err) => {
                self.render_catalog();
                self.report_failure(
                    &format!("upload {job}"),
                    &err,
                    format!("{name} failed to upload"),
                );
            }
        }
    }

    fn delete_file(&mut self, file_id: String) {
        let name = self
            .catalog
            .get(&file_id)
            .map(|file| file.name.clone())
            .unwrap_or_else(|| file_id.clone());
        if !self.frontend.confirm(&format!("Delete {name}?")) {
            debug!(file_id = %file_id, "delete declined");
            return;
        }

        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = api.delete_file(&file_id).await;
            let _ = events.send(AppEvent::Deleted { file_id, result });
        });
    }

    fn copy_link(&mut self, file_id: &str) {
        let Some(file) = self.catalog.get(file_id) else {
            self.notify(NotificationKind::Error, format!("no file named {file_id}"));
            return;
        };
        let link = links::share_link(&self.config.origin, file);
        match self.frontend.copy_to_clipboard(&link) {
            Ok(()) => self.notify(NotificationKind::Success, "link copied"),
            Err(err) => {
                warn!("clipboard write failed: {err}");
                self.notify(NotificationKind::Error, format!("copy failed: {err}"));
            }
        }
    }

    fn download(&mut self, file_id: &str) {
        let Some(file) = self.catalog.get(file_id).cloned() else {
            self.notify(NotificationKind::Error, format!("no file named {file_id}"));
            return;
        };
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let dest_dir = self.config.download_dir.clone();
        tokio::spawn(async move {
            let result = api.download_file(&file, &dest_dir).await;
            let _ = events.send(AppEvent::Downloaded(result));
        });
    }

    fn refresh_files(&self) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(AppEvent::FilesLoaded(api.list_files().await));
        });
    }

    fn load_room_info(&self) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(AppEvent::RoomInfo(api.room_info().await));
        });
    }

    /// Logs `err` and tells the user. Transient failures keep `text`;
    /// undecodable replies and rejected input say what actually went wrong.
    fn report_failure(&mut self, context: &str, err: &ClientError, text: impl Into<String>) {
        let text = text.into();
        match err.kind() {
            FailureKind::TransientNetwork => {
                error!("{context} failed: {err}");
                self.notify(NotificationKind::Error, text);
            }
            FailureKind::ProtocolDecode => {
                warn!("{context} got an unreadable reply: {err}");
                self.notify(
                    NotificationKind::Error,
                    format!("{text}: unexpected reply from the room"),
                );
            }
            FailureKind::Usage => {
                warn!("{context} rejected: {err}");
                self.notify(NotificationKind::Error, err.to_string());
            }
        }
    }

    fn notify(&mut self, kind: NotificationKind, text: impl Into<String>) {
        let notification = self.notifications.show(text, kind);
        let id = notification.id;
        self.frontend.render(Render::Notification(Some(notification)));

        let events = self.events.clone();
        let ttl = self.notifications.ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if events.send(AppEvent::NotificationFading(id)).is_err() {
                return;
            }
            tokio::time::sleep(EXIT_TRANSITION).await;
            let _ = events.send(AppEvent::NotificationExpired(id));
        });
    }

    fn render_latest(&mut self) {
        if let Some(view) = self.store.latest_view() {
            self.frontend.render(Render::Latest(view));
        }
    }

    fn render_history(&mut self, update: HistoryUpdate) {
        self.frontend.render(Render::History {
            update,
            messages: self.store.rendered_history(),
        });
    }

    fn render_catalog(&mut self) {
        self.frontend
            .render(Render::Catalog(self.catalog.view(&self.uploads)));
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn messages(&self) -> &MessageStore {
        &self.store
    }

    pub fn uploads(&self) -> &UploadJobTracker {
        &self.uploads
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn room(&self) -> Option<&RoomSummary> {
        self.room.as_ref()
    }

    pub fn notifications(&self) -> &NotificationSink {
        &self.notifications
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }
}
