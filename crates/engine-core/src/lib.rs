pub mod cache;
pub mod classify;
pub mod connection;
pub mod error;
pub mod logging;
pub mod operation;
pub mod retry;
pub mod transaction;
