// Local persistence for bookmarks and favorites settings
// This module handles the SQLite store the reconciler reads from and writes order keys to

pub mod database;
pub mod crud;
pub mod state;
pub mod bookmarks;

pub use database::{DatabaseManager, StorageError, StorageResult, get_default_db_path};
pub use state::FavoritesSettings;
pub use bookmarks::{Bookmark, CreateBookmarkInput, UpdateBookmarkInput};
