pub mod aggregate;
pub mod concurrent;
pub mod error;
pub mod paginate;
pub mod seed;
pub mod stream;
pub mod users;
