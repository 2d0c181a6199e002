// Favorites reconciliation
// Keeps an ordered favorites set in sync between the store and the grid

pub mod actor;
pub mod grid;
pub mod order;
pub mod reconciler;
pub mod store;
pub mod types;
pub mod view;

pub use actor::{spawn_reconciler, ReconcilerHandle};
pub use grid::{FavoriteCell, FavoritesGrid};
pub use reconciler::FavoritesReconciler;
pub use store::{FavoritesStore, Subscription};
pub use types::{ChangeNotification, Diff, FavoriteEntry, OrderUpdate};
pub use view::{EditingObserver, FavoritesView};
