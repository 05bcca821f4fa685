pub mod dialect;
pub mod query;
pub mod requests;
pub mod schema;
pub(crate) mod stream;
