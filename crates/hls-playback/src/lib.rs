pub mod clock;
pub mod config;
pub mod env;
pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod player;
pub mod poller;
pub mod rpc;
pub mod selector;
pub mod session;
pub mod store;
pub mod tracker;
pub mod ui;

// Re-exports for convenience
pub use crate::errors::PlaybackError;
pub use crate::model::{
    ContentRef, FileDescriptor, PlaybackSession, PositionRecord, Quality, SessionState, Source,
};
pub use crate::orchestrator::{Collaborators, Orchestrator};
pub use crate::rpc::http::HttpBackend;
pub use crate::rpc::TorrentBackend;
