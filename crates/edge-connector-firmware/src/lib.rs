//! Firmware install/abort handling and cross-reboot reconciliation (§4.8).
//!
//! The installer customarily replaces the running process in place, so the
//! only state this service can rely on surviving a reboot is whatever it
//! wrote to disk beforehand: the version marker file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use edge_connector_db::FileRepository;
use edge_connector_types::{FirmwareError, FirmwareStatus, FirmwareUpdateStatus, FirmwareVersion};
use tracing::warn;

/// A single method that hands a downloaded file to the platform's update
/// mechanism. Expected not to return if it performs an in-place executable
/// replacement (§6.3).
pub trait FirmwareInstaller: Send + Sync {
    fn install(&self, path: &Path) -> bool;
}

/// Where `FirmwareUpdateService` sends its outbound messages. Standing in
/// for the out-of-scope publish/subscribe transport.
pub trait FirmwareStatusSink: Send + Sync {
    fn status(&self, status: FirmwareUpdateStatus);
    fn version(&self, version: FirmwareVersion);
}

pub struct FirmwareUpdateService {
    repository: Arc<FileRepository>,
    marker_path: PathBuf,
    current_version: String,
    installer: Box<dyn FirmwareInstaller>,
    sink: Box<dyn FirmwareStatusSink>,
}

impl FirmwareUpdateService {
    pub fn new(
        repository: Arc<FileRepository>,
        marker_path: impl Into<PathBuf>,
        current_version: impl Into<String>,
        installer: Box<dyn FirmwareInstaller>,
        sink: Box<dyn FirmwareStatusSink>,
    ) -> Self {
        Self {
            repository,
            marker_path: marker_path.into(),
            current_version: current_version.into(),
            installer,
            sink,
        }
    }

    /// Handle an inbound `FirmwareInstall` command.
    pub fn install(&self, device_keys: Vec<String>, file_name: String) {
        if file_name.is_empty() {
            self.emit(device_keys, FirmwareStatus::Error, FirmwareError::FileNotPresent);
            return;
        }

        let info = match self.repository.get_info(&file_name) {
            Ok(Some(info)) => info,
            Ok(None) => {
                self.emit(device_keys, FirmwareStatus::Error, FirmwareError::FileNotPresent);
                return;
            }
            Err(err) => {
                warn!("firmware install lookup failed for {}: {}", file_name, err);
                self.emit(device_keys, FirmwareStatus::Error, FirmwareError::FileSystemError);
                return;
            }
        };

        if let Err(err) = fs::write(&self.marker_path, &self.current_version) {
            warn!("failed to write firmware marker file: {}", err);
            self.emit(device_keys, FirmwareStatus::Error, FirmwareError::FileSystemError);
            return;
        }

        self.emit(device_keys.clone(), FirmwareStatus::Installation, FirmwareError::None);

        // If `install` returns, it either failed outright or declined to
        // replace the process; either way there is no reboot to reconcile
        // against, so report failure now instead of waiting for one.
        if !self.installer.install(Path::new(&info.path)) {
            self.emit(device_keys, FirmwareStatus::Error, FirmwareError::InstallationFailed);
        }
    }

    /// Handle an inbound `FirmwareAbort` command. Forwarded as-is; there is
    /// no in-progress installer state this side can actually cancel.
    pub fn abort(&self, device_keys: Vec<String>) {
        self.emit(device_keys, FirmwareStatus::Aborted, FirmwareError::None);
    }

    /// Reconcile the outcome of a previously attempted install. Call once at
    /// startup. No-op if no install was attempted since the last reconcile.
    pub fn report_firmware_update_result(&self, device_key: impl Into<String>) {
        let marker = match fs::read_to_string(&self.marker_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!("failed to read firmware marker file: {}", err);
                return;
            }
        };
        let previous_version = marker.trim_end();
        let device_key = device_key.into();

        if previous_version != self.current_version {
            self.emit(vec![device_key], FirmwareStatus::Completed, FirmwareError::None);
        } else {
            self.emit(vec![device_key], FirmwareStatus::Error, FirmwareError::InstallationFailed);
        }

        if let Err(err) = fs::remove_file(&self.marker_path) {
            warn!("failed to delete firmware marker file: {}", err);
        }
    }

    /// Publish the currently running firmware version at steady state.
    pub fn publish_firmware_version(&self, device_key: impl Into<String>) {
        self.sink.version(FirmwareVersion {
            device_key: device_key.into(),
            version: self.current_version.clone(),
        });
    }

    fn emit(&self, device_keys: Vec<String>, status: FirmwareStatus, error: FirmwareError) {
        self.sink.status(FirmwareUpdateStatus::new(device_keys, status, error));
    }
}
