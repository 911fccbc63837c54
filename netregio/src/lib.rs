pub mod api;
pub mod broker;
pub mod config;
pub mod entity;
pub mod error;
pub mod migration;
pub mod relay;
pub mod schema;
pub mod server;
pub mod service;
pub mod signal;
pub mod reexports {
    pub use redis;
    pub use time;
}
