// Reference presentation adapter for a favorites grid
// Keeps a diff-built copy of the set and turns entries into renderable cells

use std::sync::Mutex;

use serde::Serialize;
use tracing::error;
use url::Url;

use super::types::{Diff, FavoriteEntry};
use super::view::{EditingObserver, FavoritesView};

/// Everything a grid cell needs to draw one favorite tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FavoriteCell {
    pub label: String,
    pub accessibility_label: String,
    pub url: Url,
    pub show_remove_button: bool,
}

#[derive(Default)]
struct GridState {
    items: Vec<FavoriteEntry>,
    editing: bool,
    last_rejected: Option<(usize, usize)>,
}

/// Grid-side copy of the favorites set, driven purely by reconciler diffs
#[derive(Default)]
pub struct FavoritesGrid {
    state: Mutex<GridState>,
}

impl FavoritesGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.with_state(|s| s.items.len())
    }

    pub fn is_editing(&self) -> bool {
        self.with_state(|s| s.editing)
    }

    /// Snapshot of the grid's copy of the set
    pub fn items(&self) -> Vec<FavoriteEntry> {
        self.with_state(|s| s.items.clone())
    }

    /// Build the cell for `position`; `None` means draw an empty placeholder
    pub fn render_item(&self, position: usize) -> Option<FavoriteCell> {
        self.with_state(|s| {
            let entry = s.items.get(position)?;
            let url = match entry.parsed_url() {
                Ok(url) => url,
                Err(reason) => {
                    error!(id = %entry.id, %reason, "cannot render favorite without a usable url");
                    return None;
                }
            };
            let label = entry.display_title().unwrap_or_default().to_string();
            Some(FavoriteCell {
                accessibility_label: label.clone(),
                label,
                url,
                show_remove_button: s.editing,
            })
        })
    }

    /// The most recent move the reconciler refused, for snapping a tile back
    pub fn take_rejected_move(&self) -> Option<(usize, usize)> {
        self.with_state(|s| s.last_rejected.take())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut GridState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn apply(&self, diff: Diff) {
        self.with_state(|s| diff.apply_to(&mut s.items));
    }
}

impl FavoritesView for FavoritesGrid {
    fn on_inserted(&self, position: usize, entry: &FavoriteEntry) {
        self.apply(Diff::Inserted {
            position,
            entry: entry.clone(),
        });
    }

    fn on_deleted(&self, position: usize) {
        self.apply(Diff::Deleted { position });
    }

    fn on_updated(&self, position: usize, entry: &FavoriteEntry) {
        self.apply(Diff::Updated {
            position,
            entry: entry.clone(),
        });
    }

    fn on_moved(&self, from: usize, to: usize) {
        self.apply(Diff::Moved { from, to });
    }

    fn on_reloaded(&self, entries: &[FavoriteEntry]) {
        self.apply(Diff::Reloaded {
            entries: entries.to_vec(),
        });
    }

    fn on_move_rejected(&self, from: usize, to: usize) {
        self.with_state(|s| s.last_rejected = Some((from, to)));
    }
}

impl EditingObserver for FavoritesGrid {
    fn on_editing_changed(&self, editing: bool) {
        self.with_state(|s| s.editing = editing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::reconciler::tests::{fav, FakeStore};
    use crate::favorites::reconciler::FavoritesReconciler;
    use crate::favorites::types::ChangeNotification;
    use std::sync::Arc;

    fn wired(entries: Vec<FavoriteEntry>) -> (FavoritesReconciler<FakeStore>, FakeStore, Arc<FavoritesGrid>) {
        let store = FakeStore::with_entries(entries);
        let grid = Arc::new(FavoritesGrid::new());
        let mut reconciler = FavoritesReconciler::new(store.clone());
        reconciler.attach_view(&grid);
        reconciler.add_editing_observer(&grid);
        reconciler.initialize();
        (reconciler, store, grid)
    }

    #[test]
    fn test_grid_follows_reconciler() {
        let (mut reconciler, _store, grid) = wired(vec![fav("a", 1), fav("b", 2)]);
        assert_eq!(grid.item_count(), 2);

        reconciler.on_change_notification(ChangeNotification::Insert {
            entry: fav("c", 3),
            position: 2,
        });
        reconciler.move_entry(2, 0).unwrap();

        assert_eq!(grid.items(), reconciler.entries().to_vec());
    }

    #[test]
    fn test_render_item_label_and_edit_mode() {
        let (mut reconciler, _store, grid) =
            wired(vec![fav("a", 1).with_title("Alpha"), fav("b", 2)]);

        let cell = grid.render_item(0).unwrap();
        assert_eq!(cell.label, "Alpha");
        assert_eq!(cell.accessibility_label, "Alpha");
        assert!(!cell.show_remove_button);

        // Untitled favorites fall back to their URL
        let cell = grid.render_item(1).unwrap();
        assert_eq!(cell.label, "https://b.example.com");
        assert_eq!(cell.url.host_str(), Some("b.example.com"));

        reconciler.set_editing(true);
        assert!(grid.is_editing());
        assert!(grid.render_item(0).unwrap().show_remove_button);
    }

    #[test]
    fn test_render_out_of_bounds_is_placeholder() {
        let (_reconciler, _store, grid) = wired(vec![fav("a", 1)]);
        assert!(grid.render_item(5).is_none());
    }

    #[test]
    fn test_rejected_move_is_reported() {
        let (mut reconciler, store, grid) = wired(vec![fav("a", 1), fav("b", 2)]);
        store.state.lock().unwrap().fail_persist = true;

        assert!(reconciler.move_entry(0, 1).is_err());

        assert_eq!(grid.take_rejected_move(), Some((0, 1)));
        assert_eq!(grid.take_rejected_move(), None);
        assert_eq!(grid.items()[0].id, "a");
    }
}
