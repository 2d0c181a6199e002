// Ordered favorites reconciliation between a bookmark store and a grid view

// Module declarations
pub mod error;
pub mod favorites;
pub mod storage;

pub use error::{ReconcileError, ReconcileResult};
pub use favorites::{
    spawn_reconciler, ChangeNotification, Diff, EditingObserver, FavoriteCell, FavoriteEntry,
    FavoritesGrid, FavoritesReconciler, FavoritesStore, FavoritesView, OrderUpdate,
    ReconcilerHandle, Subscription,
};
pub use storage::{DatabaseManager, FavoritesSettings, StorageError, StorageResult};
