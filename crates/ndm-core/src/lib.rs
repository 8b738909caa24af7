pub mod config;
pub mod logging;

pub mod command_server;
pub mod coordinator;
pub mod fallback;
pub mod format;
pub mod headers;
pub mod manager;
pub mod merge;
pub mod model;
pub mod partition;
pub mod probe;
pub mod store;
pub mod worker;
