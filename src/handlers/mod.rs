//! HTTP handlers for tables, accounts and stored procedures.

pub mod entity;
pub mod procedure;
pub mod users;
