pub mod adapter;
pub mod params;
mod row;
