pub mod paths;
pub mod settings;
pub mod targets;

pub use settings::{DEFAULT_UPLOAD_DIR, HostKeyMode, HostKeySettings, Settings};
pub use targets::{Credential, RemoteTarget, load_targets, parse_targets};
