pub mod api;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod layout;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
