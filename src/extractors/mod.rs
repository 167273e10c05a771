//! Request extractors.

mod db;
mod json;

pub use db::DbScope;
pub use json::JsonBody;
