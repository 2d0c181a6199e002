// Favorites data model shared by the store, the reconciler and the view

use serde::{Deserialize, Serialize};
use url::Url;

/// One favorite bookmark as handed out by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub order: i64,
}

impl FavoriteEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>, order: i64) -> Self {
        Self {
            id: id.into(),
            title: None,
            url: Some(url.into()),
            order,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title when present, otherwise the raw URL
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.url.as_deref())
    }

    /// Parse the URL, describing why it is unusable on failure
    pub fn parsed_url(&self) -> Result<Url, String> {
        let raw = self.url.as_deref().ok_or_else(|| "url is missing".to_string())?;
        if raw.trim().is_empty() {
            return Err("url is empty".to_string());
        }
        Url::parse(raw).map_err(|e| format!("url '{}' does not parse: {}", raw, e))
    }

    pub fn has_valid_url(&self) -> bool {
        self.parsed_url().is_ok()
    }
}

/// New order key for one entry, as passed to `FavoritesStore::persist_order`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: String,
    pub order: i64,
}

/// Storage-side mutation of the favorites set
///
/// Positions are hints computed by the store at notification time. Ids are
/// authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotification {
    Insert {
        entry: FavoriteEntry,
        position: usize,
    },
    Delete {
        id: String,
        position: usize,
    },
    Update {
        entry: FavoriteEntry,
        old_position: usize,
        new_position: Option<usize>,
    },
    /// Reserved. Moves originate in the reconciler, never in the store.
    Move { id: String, from: usize, to: usize },
}

/// Incremental change pushed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff {
    Inserted { position: usize, entry: FavoriteEntry },
    Deleted { position: usize },
    Updated { position: usize, entry: FavoriteEntry },
    Moved { from: usize, to: usize },
    Reloaded { entries: Vec<FavoriteEntry> },
}

impl Diff {
    /// Apply this diff to a presentation-side copy of the set
    pub fn apply_to(&self, items: &mut Vec<FavoriteEntry>) {
        match self {
            Diff::Inserted { position, entry } => {
                let at = (*position).min(items.len());
                items.insert(at, entry.clone());
            }
            Diff::Deleted { position } => {
                if *position < items.len() {
                    items.remove(*position);
                }
            }
            Diff::Updated { position, entry } => {
                if let Some(slot) = items.get_mut(*position) {
                    *slot = entry.clone();
                }
            }
            Diff::Moved { from, to } => {
                if *from < items.len() && *to < items.len() {
                    let entry = items.remove(*from);
                    items.insert(*to, entry);
                }
            }
            Diff::Reloaded { entries } => {
                *items = entries.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_title_falls_back_to_url() {
        let entry = FavoriteEntry::new("a", "https://example.com", 1);
        assert_eq!(entry.display_title(), Some("https://example.com"));

        let titled = entry.clone().with_title("Example");
        assert_eq!(titled.display_title(), Some("Example"));

        let blank = entry.with_title("  ");
        assert_eq!(blank.display_title(), Some("https://example.com"));
    }

    #[test]
    fn test_url_validation() {
        assert!(FavoriteEntry::new("a", "https://example.com/path", 1).has_valid_url());
        assert!(!FavoriteEntry::new("a", "", 1).has_valid_url());
        assert!(!FavoriteEntry::new("a", "not a url", 1).has_valid_url());

        let missing = FavoriteEntry {
            id: "a".to_string(),
            title: None,
            url: None,
            order: 1,
        };
        assert_eq!(missing.parsed_url().unwrap_err(), "url is missing");
    }

    #[test]
    fn test_apply_move_diff() {
        let mut items = vec![
            FavoriteEntry::new("a", "https://a.com", 1),
            FavoriteEntry::new("b", "https://b.com", 2),
            FavoriteEntry::new("c", "https://c.com", 3),
        ];
        Diff::Moved { from: 0, to: 2 }.apply_to(&mut items);

        let ids: Vec<_> = items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
