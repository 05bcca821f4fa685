pub mod config;
pub mod connect;
pub mod connection;
pub mod error;
pub mod memory;
pub mod sql;
