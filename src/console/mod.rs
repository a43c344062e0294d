//! Client side of the console: talks to the HTTP API, remembers the
//! connection across restarts and keeps resources fresh.

pub mod api;
pub mod hooks;
pub mod store;
pub mod sync;

pub use api::{ConsoleApi, ConsoleError, HttpConsoleApi, TopicsPage};
pub use hooks::{
    brokers_hook, overview_hook, topics_hook, HookConfig, MutationTracker, ResourceHook,
    ResourceState,
};
pub use store::{ConnectionStore, FileStore, MemoryStore, STORAGE_KEY};
pub use sync::{ConnectionState, ConnectionSync, RestoreState};
