pub mod backend;
pub mod detect;
pub mod ids;
pub mod message;
pub mod notify;
pub mod schedule;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod watcher;

pub use notify::Notifier;
pub use snapshot::{ChangeEvent, Records, ResourceRecord, Snapshot};
pub use source::MetadataSource;
pub use store::StateStore;
pub use watcher::{WatchSettings, Watcher};
