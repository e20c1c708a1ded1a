//! Presence tracking by periodic reconciliation.
//!
//! A [`Poller`] repeatedly reads the set of available users (or a single
//! tracked user) from a REST record store, diffs it against the snapshot
//! it holds and hands the resulting [`ChangeEvent`]s to an
//! [`EventSink`](notify::EventSink).

pub mod config;
pub mod differ;
pub mod notify;
pub mod poller;
pub mod store;
pub mod types;

pub use config::{Config, ConfigError, PollConfig};
pub use poller::Poller;
pub use store::{FetchError, RecordStore, RestStore, WatchTarget};
pub use types::{ChangeEvent, Record, Snapshot};
