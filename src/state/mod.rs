/// State management module
///
/// This module handles all persistent state, including:
/// - Database connections, schema and queries (library.rs)
/// - Shared row structures (data.rs)
/// - Notes classification into plain text or catalogue metadata (notes.rs)

pub mod library;
pub mod data;
pub mod notes;
