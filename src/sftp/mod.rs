//! SFTP uploads over an established SSH connection

pub mod transfer;

pub use transfer::{create_dir_all, remote_file_path, upload_buffer, upload_file};
