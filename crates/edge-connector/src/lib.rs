//! Device-side connector library: the file-transfer and firmware-update
//! subsystem of a cloud IoT platform client. Ties together the file
//! repository, file store, command buffer, URL downloader, and per-transfer
//! session state machine behind one inbound/outbound message surface
//! (§4.7–4.8 of the specification this crate implements).
//!
//! The publish/subscribe transport, message encoding, and device-manifest
//! configuration are out of scope; callers wire this crate to their own
//! transport through [`PlatformConnectivity`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

use edge_connector_db::FileRepository;
use edge_connector_firmware::{FirmwareInstaller, FirmwareStatusSink, FirmwareUpdateService};
use edge_connector_hash::{md5, to_hex};
use edge_connector_transfer::{
    CommandBuffer, Downloader, FileStore, FileTransferSession, TerminalCallback,
};
use edge_connector_types::{
    FileBinaryRequest, FileBinaryResponse, FileDelete, FileInfo, FileListResponse,
    FileUploadAbort, FileUploadInitiate, FileUploadStatus, FileUrlDownloadInitiate, TransferError,
    TransferStatus,
};

pub use edge_connector_db::RepositoryError;
pub use edge_connector_firmware::{FirmwareInstaller as FirmwareInstallerTrait, FirmwareStatusSink as FirmwareStatusSinkTrait};
pub use edge_connector_transfer::Downloader as DownloaderTrait;

/// Everything this crate sends back to the platform. Stands in for the
/// out-of-scope publish/subscribe transport and message serialization.
pub trait PlatformConnectivity: Send + Sync {
    fn send_file_binary_request(&self, device_key: &str, request: FileBinaryRequest);
    fn send_file_upload_status(&self, device_key: &str, status: FileUploadStatus);
    fn send_file_list_response(&self, device_key: &str, response: FileListResponse);
    /// Acknowledge a command that has no richer response of its own
    /// (`FileDelete`, `FilePurge`).
    fn ack(&self, device_key: &str);
}

type DownloaderFactory = Arc<dyn Fn() -> Arc<dyn Downloader> + Send + Sync>;

#[derive(Clone, PartialEq, Eq, Hash)]
enum SessionKey {
    /// A device has at most one active platform-upload session; the wire
    /// protocol's `FileBinaryResponse` carries no file name to disambiguate
    /// further (see DESIGN.md).
    Platform(String),
    /// A device has at most one active URL-download session (its abort
    /// command carries no file name either).
    Url(String),
}

impl SessionKey {
    fn device_key(&self) -> &str {
        match self {
            SessionKey::Platform(key) | SessionKey::Url(key) => key,
        }
    }
}

/// Registry of active transfers, keyed by device, plus dispatch of inbound
/// protocol messages and commit of completed transfers (§4.7).
pub struct FileManagementService {
    repository: Arc<FileRepository>,
    store: Arc<FileStore>,
    command_buffer: Arc<CommandBuffer>,
    connectivity: Arc<dyn PlatformConnectivity>,
    downloader_factory: DownloaderFactory,
    max_file_size: u64,
    sessions: Arc<Mutex<HashMap<SessionKey, Arc<Mutex<FileTransferSession>>>>>,
}

impl FileManagementService {
    pub fn new(
        repository: Arc<FileRepository>,
        store: Arc<FileStore>,
        command_buffer: Arc<CommandBuffer>,
        connectivity: Arc<dyn PlatformConnectivity>,
        downloader_factory: DownloaderFactory,
        max_file_size: u64,
    ) -> Self {
        Self {
            repository,
            store,
            command_buffer,
            connectivity,
            downloader_factory,
            max_file_size,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn handle_file_upload_initiate(&self, device_key: &str, msg: FileUploadInitiate) {
        if msg.size > self.max_file_size {
            self.connectivity.send_file_upload_status(
                device_key,
                FileUploadStatus::new(TransferStatus::ErrorTransfer, TransferError::UnsupportedFileSize),
            );
            return;
        }

        let key = SessionKey::Platform(device_key.to_string());
        {
            let sessions = self.sessions.lock().expect("session registry lock poisoned");
            if sessions.contains_key(&key) {
                drop(sessions);
                self.connectivity.send_file_upload_status(
                    device_key,
                    FileUploadStatus::new(TransferStatus::ErrorTransfer, TransferError::TransferProtocolDisabled),
                );
                return;
            }
        }

        let on_terminal = self.terminal_callback(key.clone());
        let session = Arc::new(Mutex::new(FileTransferSession::new_platform_upload(
            msg.name.clone(),
            msg.size,
            msg.hash,
            self.command_buffer.clone(),
            on_terminal,
        )));
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(key, session);

        self.connectivity.send_file_upload_status(
            device_key,
            FileUploadStatus::new(TransferStatus::FileTransfer, TransferError::None),
        );
        self.connectivity
            .send_file_binary_request(device_key, FileBinaryRequest { name: msg.name, chunk_index: 0 });
    }

    pub fn handle_file_binary_response(&self, device_key: &str, msg: FileBinaryResponse) {
        let parsed = match msg.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("malformed file binary response from {}: {}", device_key, err);
                return;
            }
        };

        let key = SessionKey::Platform(device_key.to_string());
        let session_arc = self.sessions.lock().expect("session registry lock poisoned").get(&key).cloned();
        let Some(session_arc) = session_arc else {
            warn!("file binary response from {} with no active upload session", device_key);
            return;
        };

        let (error, status, done, next_request) = {
            let mut session = session_arc.lock().expect("session lock poisoned");
            let error = session.push_chunk(parsed);
            (error, session.status(), session.done(), session.next_chunk_request())
        };

        if done {
            // Terminal: the session already queued the terminal callback
            // onto the command buffer, which commits (on success) and emits
            // the final status off this thread.
            return;
        }

        if error == TransferError::None {
            if !next_request.is_none() {
                self.connectivity.send_file_binary_request(device_key, next_request);
            }
        } else {
            self.connectivity
                .send_file_upload_status(device_key, FileUploadStatus::new(status, error));
        }
    }

    pub fn handle_file_upload_abort(&self, device_key: &str, _msg: FileUploadAbort) {
        self.abort_session(&SessionKey::Platform(device_key.to_string()));
    }

    pub fn handle_file_url_download_initiate(&self, device_key: &str, msg: FileUrlDownloadInitiate) {
        let key = SessionKey::Url(device_key.to_string());
        {
            let sessions = self.sessions.lock().expect("session registry lock poisoned");
            if sessions.contains_key(&key) {
                drop(sessions);
                self.connectivity.send_file_upload_status(
                    device_key,
                    FileUploadStatus::new(TransferStatus::ErrorTransfer, TransferError::TransferProtocolDisabled),
                );
                return;
            }
        }

        let downloader = (self.downloader_factory)();
        let on_terminal = self.terminal_callback(key.clone());
        let session = Arc::new(Mutex::new(FileTransferSession::new_url_download(
            msg.url,
            downloader,
            self.command_buffer.clone(),
            on_terminal,
        )));
        self.sessions
            .lock()
            .expect("session registry lock poisoned")
            .insert(key, session.clone());

        FileTransferSession::trigger_download(&session);
        self.connectivity.send_file_upload_status(
            device_key,
            FileUploadStatus::new(TransferStatus::FileTransfer, TransferError::None),
        );
    }

    pub fn handle_file_url_download_abort(&self, device_key: &str) {
        self.abort_session(&SessionKey::Url(device_key.to_string()));
    }

    pub fn handle_file_list_request(&self, device_key: &str) {
        match self.repository.list_names() {
            Ok(names) => self.connectivity.send_file_list_response(device_key, FileListResponse { names }),
            Err(err) => warn!("failed to list files for {}: {}", device_key, err),
        }
    }

    pub fn handle_file_delete(&self, device_key: &str, msg: FileDelete) {
        if let Err(err) = self.repository.remove(&msg.name) {
            warn!("failed to remove {} from repository: {}", msg.name, err);
        }
        self.store.delete_file(&msg.name);
        self.connectivity.ack(device_key);
    }

    pub fn handle_file_purge(&self, device_key: &str) {
        if let Err(err) = self.repository.remove_all() {
            warn!("failed to clear file repository: {}", err);
        }
        self.store.clear();
        self.connectivity.ack(device_key);
    }

    fn abort_session(&self, key: &SessionKey) {
        let session_arc = self.sessions.lock().expect("session registry lock poisoned").get(key).cloned();
        if let Some(session_arc) = session_arc {
            session_arc.lock().expect("session lock poisoned").abort();
        }
    }

    /// Builds the callback a session posts to the command buffer on every
    /// terminal transition (§4.6). Owns the commit-on-success and
    /// destroy-on-any-terminal-outcome logic from §4.7 in one place so it
    /// always runs off the transport thread, regardless of which flavor of
    /// session produced it.
    fn terminal_callback(&self, key: SessionKey) -> TerminalCallback {
        let repository = self.repository.clone();
        let store = self.store.clone();
        let connectivity = self.connectivity.clone();
        let sessions = self.sessions.clone();

        Arc::new(move |status, error| {
            let session_arc = sessions.lock().expect("session registry lock poisoned").remove(&key);
            let Some(session_arc) = session_arc else { return };
            let device_key = key.device_key().to_string();

            let (name, bytes) = {
                let session = session_arc.lock().expect("session lock poisoned");
                (session.name().to_string(), session.collected_bytes())
            };

            if status != TransferStatus::FileReady {
                connectivity.send_file_upload_status(&device_key, FileUploadStatus::new(status, error));
                return;
            }

            match store.write_file(&name, &bytes) {
                Some(path) => {
                    let info = FileInfo::new(name, to_hex(&md5(&bytes)), path.to_string_lossy().to_string());
                    match repository.store(&info) {
                        Ok(()) => connectivity
                            .send_file_upload_status(&device_key, FileUploadStatus::new(status, error)),
                        Err(err) => {
                            warn!("failed to record committed file in repository: {}", err);
                            connectivity.send_file_upload_status(
                                &device_key,
                                FileUploadStatus::new(TransferStatus::ErrorTransfer, TransferError::FileSystemError),
                            );
                        }
                    }
                }
                None => connectivity.send_file_upload_status(
                    &device_key,
                    FileUploadStatus::new(TransferStatus::ErrorTransfer, TransferError::FileSystemError),
                ),
            }
        })
    }
}

/// Everything a caller configures at startup. Reading these values from the
/// environment, a file, or a manifest is the embedding application's job —
/// this library only accepts the resolved settings.
pub struct ConnectorConfig {
    /// Where completed transfers are written.
    pub store_dir: PathBuf,
    /// Where the file repository's database lives on disk.
    pub repository_path: PathBuf,
    /// Rejects `FileUploadInitiate` for anything larger than this, in bytes.
    pub max_file_size: u64,
    /// The firmware version string this running process reports.
    pub current_firmware_version: String,
    /// Where the pre-install version marker is written before handing
    /// control to the installer.
    pub firmware_marker_path: PathBuf,
}

/// Wires together the repository, store, command buffer, transfer service,
/// and firmware service that make up a full device-side connector.
pub struct Connector {
    pub files: FileManagementService,
    pub firmware: FirmwareUpdateService,
    command_buffer: Arc<CommandBuffer>,
}

impl Connector {
    pub fn open(
        config: ConnectorConfig,
        connectivity: Arc<dyn PlatformConnectivity>,
        downloader_factory: DownloaderFactory,
        firmware_installer: Box<dyn FirmwareInstaller>,
        firmware_sink: Box<dyn FirmwareStatusSink>,
    ) -> Result<Self, OpenError> {
        let repository = Arc::new(FileRepository::open(&config.repository_path)?);
        let store = Arc::new(FileStore::new(&config.store_dir)?);
        let command_buffer = Arc::new(CommandBuffer::new());

        let files = FileManagementService::new(
            repository.clone(),
            store,
            command_buffer.clone(),
            connectivity,
            downloader_factory,
            config.max_file_size,
        );
        let firmware = FirmwareUpdateService::new(
            repository,
            config.firmware_marker_path,
            config.current_firmware_version,
            firmware_installer,
            firmware_sink,
        );
        Ok(Self {
            files,
            firmware,
            command_buffer,
        })
    }

    /// Drain and join the shared command buffer. `CommandBuffer::drop` does
    /// the actual draining once every `Arc` to it — including the one held
    /// by `self.files` — goes away.
    pub fn shutdown(self) {
        drop(self);
    }
}

/// Anything that can go wrong bringing up a [`Connector`]: the repository or
/// the file store directory could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("file repository: {0}")]
    Repository(#[from] RepositoryError),
    #[error("file store directory: {0}")]
    Store(#[from] std::io::Error),
}
