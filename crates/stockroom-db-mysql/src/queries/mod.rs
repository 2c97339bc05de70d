//! SQL query modules for the MySQL storage backend.
//!
//! This module contains the SQL query implementations organized by table.

pub mod products;
pub mod webhooks;
