// Presentation-side callbacks
// The reconciler only holds weak references to these; a dropped view turns
// diff emission into a no-op.

use super::types::{Diff, FavoriteEntry};

/// Receives ordered diffs from the reconciler
pub trait FavoritesView: Send + Sync {
    fn on_inserted(&self, position: usize, entry: &FavoriteEntry);
    fn on_deleted(&self, position: usize);
    fn on_updated(&self, position: usize, entry: &FavoriteEntry);
    fn on_moved(&self, from: usize, to: usize);

    /// Full re-fetch; the view should replace its copy wholesale
    fn on_reloaded(&self, entries: &[FavoriteEntry]);

    /// A requested move could not be persisted and the set was left as it was.
    /// Views that moved the tile optimistically should move it back.
    fn on_move_rejected(&self, _from: usize, _to: usize) {}
}

/// Receives edit-mode changes
pub trait EditingObserver: Send + Sync {
    fn on_editing_changed(&self, editing: bool);
}

/// Route a diff to the matching view callback
pub(crate) fn dispatch(view: &dyn FavoritesView, diff: &Diff) {
    match diff {
        Diff::Inserted { position, entry } => view.on_inserted(*position, entry),
        Diff::Deleted { position } => view.on_deleted(*position),
        Diff::Updated { position, entry } => view.on_updated(*position, entry),
        Diff::Moved { from, to } => view.on_moved(*from, *to),
        Diff::Reloaded { entries } => view.on_reloaded(entries),
    }
}
