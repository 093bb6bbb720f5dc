pub mod command_buffer;
pub mod downloader;
pub mod session;
pub mod store;

pub use command_buffer::CommandBuffer;
pub use downloader::{Downloader, HttpDownloader, StatusCallback};
pub use session::{FileTransferSession, TerminalCallback};
pub use store::{create_binary, FileStore};
