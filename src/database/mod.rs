/*!
 * Item store backed by SQLite.
 *
 * This module provides the session's persistent state:
 * - Items with their authoritative destination text and status
 * - Session metadata and glossary rules
 * - Opaque binary assets
 */

pub mod connection;
pub mod models;
pub mod schema;
pub mod store;

// Re-export main types
pub use connection::DatabaseConnection;
pub use models::{Item, ItemStatus, Mutation, StatusCounts};
pub use store::ItemStore;
