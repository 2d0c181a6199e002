// Bookmarks data model and storage operations
// Favorites are bookmarks with is_favorite set, ordered by sort_order

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::database::{DatabaseManager, StorageError, StorageResult};
use crate::favorites::store::{FavoritesStore, Subscription};
use crate::favorites::types::{ChangeNotification, FavoriteEntry, OrderUpdate};

const BOOKMARK_COLUMNS: &str =
    "id, title, url, is_favorite, sort_order, created_at, updated_at";

/// A stored bookmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub is_favorite: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Bookmark {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Bookmark {
            id: row.get(0)?,
            title: row.get(1)?,
            url: row.get(2)?,
            is_favorite: row.get::<_, i32>(3)? != 0,
            sort_order: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    pub fn to_entry(&self) -> FavoriteEntry {
        FavoriteEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            order: self.sort_order,
        }
    }
}

/// Input for creating a new bookmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookmarkInput {
    pub title: Option<String>,
    pub url: Option<String>,
    pub is_favorite: bool,
}

/// Input for updating an existing bookmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBookmarkInput {
    pub title: Option<String>,
    pub url: Option<String>,
    pub sort_order: Option<i64>,
}

/// Position a favorite with `sort_order` has in the ordered favorites set
fn favorite_position(conn: &Connection, sort_order: i64, id: &str) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookmarks WHERE is_favorite = 1 AND id != ?2 AND sort_order < ?1",
        params![sort_order, id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn select_bookmark(conn: &Connection, id: &str) -> rusqlite::Result<Option<Bookmark>> {
    conn.query_row(
        &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
        params![id],
        Bookmark::from_row,
    )
    .optional()
}

fn next_favorite_order(conn: &Connection, spacing: i64) -> rusqlite::Result<Option<i64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sort_order) FROM bookmarks WHERE is_favorite = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(max.map_or(Some(spacing), |m| m.checked_add(spacing)))
}

/// Rewrite every favorite with evenly spaced keys, keeping their order.
///
/// Returns the re-keyed favorites and a free key after the last one.
fn rekey_favorites(conn: &Connection, spacing: i64) -> rusqlite::Result<(Vec<Bookmark>, i64)> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bookmarks WHERE is_favorite = 1 ORDER BY sort_order, id",
        BOOKMARK_COLUMNS
    ))?;
    let mut favorites = stmt
        .query_map([], Bookmark::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let slots = i64::try_from(favorites.len()).unwrap_or(i64::MAX - 1).saturating_add(1);
    let spacing = spacing.clamp(1, (i64::MAX / slots).max(1));
    let now = Utc::now().to_rfc3339();

    let mut next = spacing;
    for favorite in favorites.iter_mut() {
        favorite.sort_order = next;
        favorite.updated_at = now.clone();
        conn.execute(
            "UPDATE bookmarks SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
            params![next, now, favorite.id],
        )?;
        next = next.saturating_add(spacing);
    }

    Ok((favorites, next))
}

/// Key for a favorite appended after the current last one.
///
/// When no key is left above the last favorite the set is re-keyed first and
/// the re-keyed favorites are returned so they can be announced.
fn append_favorite_order(conn: &Connection, spacing: i64) -> rusqlite::Result<(i64, Vec<Bookmark>)> {
    match next_favorite_order(conn, spacing)? {
        Some(order) => Ok((order, Vec::new())),
        None => {
            tracing::debug!("favorite order keys exhausted, re-keying favorites");
            let (rekeyed, order) = rekey_favorites(conn, spacing)?;
            Ok((order, rekeyed))
        }
    }
}

impl DatabaseManager {
    /// Create a new bookmark; favorites are appended to the end of the set
    pub fn create_bookmark(&self, input: CreateBookmarkInput) -> StorageResult<Bookmark> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let spacing = self.get_favorites_settings()?.effective_spacing();

        let (bookmark, position, rekeyed) = self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let (sort_order, rekeyed) = if input.is_favorite {
                append_favorite_order(&tx, spacing)?
            } else {
                (0, Vec::new())
            };

            tx.execute(
                r#"
                INSERT INTO bookmarks (id, title, url, is_favorite, sort_order, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
                params![id, input.title, input.url, input.is_favorite as i32, sort_order, now],
            )?;

            let bookmark = select_bookmark(&tx, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let position = favorite_position(&tx, bookmark.sort_order, &bookmark.id)?;
            tx.commit()?;
            Ok((bookmark, position, rekeyed))
        })?;

        self.notify_rekeyed(rekeyed);
        if bookmark.is_favorite {
            self.notify(ChangeNotification::Insert {
                entry: bookmark.to_entry(),
                position,
            });
        }

        Ok(bookmark)
    }

    /// Get a bookmark by ID
    pub fn get_bookmark(&self, id: &str) -> StorageResult<Option<Bookmark>> {
        self.with_connection(|conn| select_bookmark(conn, id))
    }

    /// Get all bookmarks, favorites first in order
    pub fn get_all_bookmarks(&self) -> StorageResult<Vec<Bookmark>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM bookmarks ORDER BY is_favorite DESC, sort_order, created_at",
                BOOKMARK_COLUMNS
            ))?;
            let bookmarks = stmt
                .query_map([], Bookmark::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(bookmarks)
        })
    }

    /// Get favorites ordered by sort_order
    pub fn get_favorites(&self) -> StorageResult<Vec<Bookmark>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM bookmarks WHERE is_favorite = 1 ORDER BY sort_order",
                BOOKMARK_COLUMNS
            ))?;
            let favorites = stmt
                .query_map([], Bookmark::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(favorites)
        })
    }

    /// Update an existing bookmark
    pub fn update_bookmark(&self, id: &str, input: UpdateBookmarkInput) -> StorageResult<Option<Bookmark>> {
        let Some(before) = self.get_bookmark(id)? else {
            return Ok(None);
        };

        let (after, old_position, new_position) = self.with_connection(|conn| {
            let old_position = favorite_position(conn, before.sort_order, id)?;

            let mut updates = vec!["updated_at = ?"];
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(Utc::now().to_rfc3339())];

            if let Some(ref title) = input.title {
                updates.push("title = ?");
                params_vec.push(Box::new(title.clone()));
            }
            if let Some(ref url) = input.url {
                updates.push("url = ?");
                params_vec.push(Box::new(url.clone()));
            }
            if let Some(sort_order) = input.sort_order {
                updates.push("sort_order = ?");
                params_vec.push(Box::new(sort_order));
            }

            params_vec.push(Box::new(id.to_string()));

            let sql = format!("UPDATE bookmarks SET {} WHERE id = ?", updates.join(", "));
            conn.execute(
                &sql,
                rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            )?;

            let after = select_bookmark(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let new_position = favorite_position(conn, after.sort_order, id)?;
            Ok((after, old_position, new_position))
        })?;

        if after.is_favorite {
            self.notify(ChangeNotification::Update {
                entry: after.to_entry(),
                old_position,
                new_position: (new_position != old_position).then_some(new_position),
            });
        }

        Ok(Some(after))
    }

    /// Mark or unmark a bookmark as favorite
    pub fn set_favorite(&self, id: &str, favorite: bool) -> StorageResult<Bookmark> {
        let before = self
            .get_bookmark(id)?
            .ok_or_else(|| StorageError::NotFound(format!("bookmark '{}'", id)))?;
        if before.is_favorite == favorite {
            return Ok(before);
        }

        let spacing = self.get_favorites_settings()?.effective_spacing();
        let (after, position, rekeyed) = self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let old_position = favorite_position(&tx, before.sort_order, id)?;
            let (sort_order, rekeyed) = if favorite {
                append_favorite_order(&tx, spacing)?
            } else {
                (before.sort_order, Vec::new())
            };

            tx.execute(
                "UPDATE bookmarks SET is_favorite = ?1, sort_order = ?2, updated_at = ?3 WHERE id = ?4",
                params![favorite as i32, sort_order, Utc::now().to_rfc3339(), id],
            )?;

            let after = select_bookmark(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            let position = if favorite {
                favorite_position(&tx, after.sort_order, id)?
            } else {
                old_position
            };
            tx.commit()?;
            Ok((after, position, rekeyed))
        })?;

        self.notify_rekeyed(rekeyed);

        let notification = if favorite {
            ChangeNotification::Insert {
                entry: after.to_entry(),
                position,
            }
        } else {
            ChangeNotification::Delete {
                id: after.id.clone(),
                position,
            }
        };
        self.notify(notification);

        Ok(after)
    }

    /// Delete a bookmark by ID
    pub fn delete_bookmark(&self, id: &str) -> StorageResult<bool> {
        let Some(before) = self.get_bookmark(id)? else {
            return Ok(false);
        };

        let position = self.with_connection(|conn| {
            let position = favorite_position(conn, before.sort_order, id)?;
            conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
            Ok(position)
        })?;

        if before.is_favorite {
            self.notify(ChangeNotification::Delete {
                id: before.id,
                position,
            });
        }

        Ok(true)
    }

    /// Write new sort orders for favorites in one transaction.
    ///
    /// No change notification is sent; the caller already holds the new order.
    pub fn persist_favorite_order(&self, updates: &[OrderUpdate]) -> StorageResult<()> {
        let missing = self.with_connection_mut(|conn| {
            let tx = conn.transaction()?;
            let mut missing = None;
            for update in updates {
                let rows = tx.execute(
                    "UPDATE bookmarks SET sort_order = ?1, updated_at = ?2 WHERE id = ?3 AND is_favorite = 1",
                    params![update.order, Utc::now().to_rfc3339(), update.id],
                )?;
                if rows == 0 {
                    missing = Some(update.id.clone());
                    break;
                }
            }

            // Dropping the transaction without commit rolls everything back
            if missing.is_none() {
                tx.commit()?;
            }
            Ok(missing)
        })?;

        match missing {
            Some(id) => Err(StorageError::NotFound(format!("favorite '{}'", id))),
            None => Ok(()),
        }
    }

    /// Announce favorites whose keys were rewritten; their positions are unchanged
    fn notify_rekeyed(&self, rekeyed: Vec<Bookmark>) {
        for (position, bookmark) in rekeyed.into_iter().enumerate() {
            self.notify(ChangeNotification::Update {
                entry: bookmark.to_entry(),
                old_position: position,
                new_position: None,
            });
        }
    }
}

impl FavoritesStore for DatabaseManager {
    fn fetch_all(&self) -> StorageResult<Vec<FavoriteEntry>> {
        Ok(self.get_favorites()?.iter().map(Bookmark::to_entry).collect())
    }

    fn persist_order(&self, updates: &[OrderUpdate]) -> StorageResult<()> {
        self.persist_favorite_order(updates)
    }

    fn subscribe(&self) -> Subscription {
        let (sender, subscription) = Subscription::channel();
        self.set_subscriber(sender);
        subscription
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_db() -> (DatabaseManager, PathBuf) {
        let temp_dir = std::env::temp_dir();
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_path = temp_dir.join(format!(
            "favorites_bookmarks_test_{}_{}.db",
            std::process::id(),
            counter
        ));
        let _ = std::fs::remove_file(&db_path);
        let manager = DatabaseManager::new(db_path.clone()).unwrap();
        (manager, db_path)
    }

    fn favorite(manager: &DatabaseManager, url: &str) -> Bookmark {
        manager
            .create_bookmark(CreateBookmarkInput {
                title: None,
                url: Some(url.to_string()),
                is_favorite: true,
            })
            .unwrap()
    }

    #[test]
    fn test_create_favorites_appends_in_order() {
        let (manager, db_path) = create_test_db();

        let a = favorite(&manager, "https://a.com");
        let b = favorite(&manager, "https://b.com");
        manager
            .create_bookmark(CreateBookmarkInput {
                title: Some("plain".to_string()),
                url: Some("https://plain.com".to_string()),
                is_favorite: false,
            })
            .unwrap();

        assert!(a.sort_order < b.sort_order);
        let ids: Vec<_> = manager.get_favorites().unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(manager.get_all_bookmarks().unwrap().len(), 3);

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_mutations_emit_notifications() {
        let (manager, db_path) = create_test_db();
        let mut changes = manager.subscribe();

        let a = favorite(&manager, "https://a.com");
        let b = favorite(&manager, "https://b.com");
        assert!(matches!(changes.try_next(), Some(ChangeNotification::Insert { position: 0, .. })));
        assert!(matches!(changes.try_next(), Some(ChangeNotification::Insert { position: 1, .. })));

        manager
            .update_bookmark(
                &a.id,
                UpdateBookmarkInput {
                    sort_order: Some(b.sort_order + 1),
                    ..Default::default()
                },
            )
            .unwrap();
        match changes.try_next() {
            Some(ChangeNotification::Update {
                entry,
                old_position,
                new_position,
            }) => {
                assert_eq!(entry.id, a.id);
                assert_eq!(old_position, 0);
                assert_eq!(new_position, Some(1));
            }
            other => panic!("unexpected notification: {:?}", other),
        }

        manager.set_favorite(&b.id, false).unwrap();
        assert_eq!(
            changes.try_next(),
            Some(ChangeNotification::Delete {
                id: b.id.clone(),
                position: 0
            })
        );

        manager.delete_bookmark(&b.id).unwrap();
        assert_eq!(changes.try_next(), None);

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_append_after_last_key_rekeys_favorites() {
        let (manager, db_path) = create_test_db();
        let a = favorite(&manager, "https://a.com");
        let b = favorite(&manager, "https://b.com");
        manager
            .persist_favorite_order(&[OrderUpdate {
                id: b.id.clone(),
                order: i64::MAX - 1,
            }])
            .unwrap();
        let mut changes = manager.subscribe();

        let c = favorite(&manager, "https://c.com");

        let favorites = manager.get_favorites().unwrap();
        let ids: Vec<_> = favorites.iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone(), c.id.clone()]);
        assert!(favorites.windows(2).all(|w| w[0].sort_order < w[1].sort_order));

        // Re-keyed favorites are announced before the new one
        for expected in [&a.id, &b.id] {
            match changes.try_next() {
                Some(ChangeNotification::Update { entry, new_position, .. }) => {
                    assert_eq!(&entry.id, expected);
                    assert_eq!(new_position, None);
                }
                other => panic!("unexpected notification: {:?}", other),
            }
        }
        assert!(matches!(changes.try_next(), Some(ChangeNotification::Insert { position: 2, .. })));

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_persist_order_is_atomic() {
        let (manager, db_path) = create_test_db();
        let a = favorite(&manager, "https://a.com");
        let b = favorite(&manager, "https://b.com");

        let result = manager.persist_favorite_order(&[
            OrderUpdate {
                id: a.id.clone(),
                order: 9000,
            },
            OrderUpdate {
                id: "missing".to_string(),
                order: 1,
            },
        ]);
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(manager.get_bookmark(&a.id).unwrap().unwrap().sort_order, a.sort_order);

        manager
            .persist_favorite_order(&[OrderUpdate {
                id: a.id.clone(),
                order: b.sort_order + 10,
            }])
            .unwrap();
        let ids: Vec<_> = manager.get_favorites().unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_persist_order_sends_no_notification() {
        let (manager, db_path) = create_test_db();
        let a = favorite(&manager, "https://a.com");
        let mut changes = manager.subscribe();

        manager
            .persist_favorite_order(&[OrderUpdate {
                id: a.id,
                order: 42,
            }])
            .unwrap();

        assert_eq!(changes.try_next(), None);

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_new_subscription_replaces_old() {
        let (manager, db_path) = create_test_db();
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();

        favorite(&manager, "https://a.com");

        assert_eq!(first.try_next(), None);
        assert!(second.try_next().is_some());

        let _ = std::fs::remove_file(&db_path);
    }

    #[test]
    fn test_set_favorite_missing_bookmark() {
        let (manager, db_path) = create_test_db();

        let result = manager.set_favorite("nope", true);
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let _ = std::fs::remove_file(&db_path);
    }
}
