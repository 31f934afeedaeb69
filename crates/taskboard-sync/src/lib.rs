//! Taskboard Sync - Data synchronizer
//!
//! Keeps the authoritative chart snapshot current: full fetches over HTTP,
//! partial change sets from the live WebSocket channel, and the channel's
//! reconnect and keepalive lifecycle.

pub mod backoff;
pub mod error;
pub mod fetch;
pub mod live;
pub mod store;
pub mod synchronizer;

pub use backoff::ReconnectPolicy;
pub use error::SyncError;
pub use fetch::{FetchConfig, SnapshotFetcher};
pub use live::{
    connect_live, interpret_frame, normalize_channel_url, ChannelState, ChannelStatus, LiveConfig,
    LiveEvent, LiveHandle, Reconnect, ReconnectMachine,
};
pub use store::{apply_diff, DiffOutcome, SnapshotStore};
pub use synchronizer::Synchronizer;
