pub mod app;
pub mod config;
pub mod feeds;
pub mod host;
pub mod humanize;
pub mod messaging;
pub mod observability;
pub mod prefs;
pub mod queue;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod transport;
