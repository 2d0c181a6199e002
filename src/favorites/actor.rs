// Serialized event queue around a reconciler
// Store notifications and presentation commands are handled one at a time on a
// single task, so the diff stream stays monotonic.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::reconciler::FavoritesReconciler;
use super::store::{FavoritesStore, Subscription};
use crate::error::{ReconcileError, ReconcileResult};

enum Command {
    Move {
        from: usize,
        to: usize,
        reply: oneshot::Sender<ReconcileResult<()>>,
    },
    SetEditing(bool),
    Count(oneshot::Sender<usize>),
    Resync(oneshot::Sender<ReconcileResult<()>>),
    Shutdown,
}

/// Handle to a reconciler running on its own task
pub struct ReconcilerHandle<S: FavoritesStore> {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<FavoritesReconciler<S>>,
}

/// Move `reconciler` onto a task that owns it from now on.
///
/// An uninitialized reconciler is initialized first.
pub fn spawn_reconciler<S>(mut reconciler: FavoritesReconciler<S>) -> ReconcilerHandle<S>
where
    S: FavoritesStore + 'static,
{
    let changes = reconciler.take_subscription().unwrap_or_else(|| {
        reconciler.initialize();
        reconciler
            .take_subscription()
            .unwrap_or_else(|| Subscription::channel().1)
    });

    let (commands, inbox) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(reconciler, changes, inbox));

    ReconcilerHandle { commands, task }
}

async fn run<S: FavoritesStore>(
    mut reconciler: FavoritesReconciler<S>,
    mut changes: Subscription,
    mut inbox: mpsc::UnboundedReceiver<Command>,
) -> FavoritesReconciler<S> {
    let mut store_open = true;

    loop {
        tokio::select! {
            // Store changes first so user moves never act on stale positions
            biased;

            notification = changes.recv(), if store_open => match notification {
                Some(notification) => reconciler.on_change_notification(notification),
                None => {
                    debug!("store subscription closed");
                    store_open = false;
                }
            },
            command = inbox.recv() => match command {
                Some(Command::Move { from, to, reply }) => {
                    let _ = reply.send(reconciler.move_entry(from, to));
                }
                Some(Command::SetEditing(editing)) => reconciler.set_editing(editing),
                Some(Command::Count(reply)) => {
                    let _ = reply.send(reconciler.count());
                }
                Some(Command::Resync(reply)) => {
                    let _ = reply.send(reconciler.resync());
                }
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    reconciler
}

impl<S: FavoritesStore> ReconcilerHandle<S> {
    /// Presentation drag-and-drop entry point
    pub async fn request_move(&self, from: usize, to: usize) -> ReconcileResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Move { from, to, reply })?;
        response.await.map_err(|_| ReconcileError::Closed)?
    }

    pub fn set_editing(&self, editing: bool) -> ReconcileResult<()> {
        self.send(Command::SetEditing(editing))
    }

    pub async fn count(&self) -> ReconcileResult<usize> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Count(reply))?;
        response.await.map_err(|_| ReconcileError::Closed)
    }

    pub async fn resync(&self) -> ReconcileResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Resync(reply))?;
        response.await.map_err(|_| ReconcileError::Closed)?
    }

    /// Stop the task and get the reconciler back
    pub async fn shutdown(self) -> ReconcileResult<FavoritesReconciler<S>> {
        let _ = self.commands.send(Command::Shutdown);
        self.task.await.map_err(|_| ReconcileError::Closed)
    }

    fn send(&self, command: Command) -> ReconcileResult<()> {
        self.commands.send(command).map_err(|_| ReconcileError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favorites::reconciler::tests::{fav, FakeStore, RecordingView};
    use crate::favorites::types::ChangeNotification;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_actor_applies_notifications_before_moves() {
        let store = FakeStore::with_entries(vec![fav("a", 1), fav("b", 2), fav("c", 3)]);
        let view = Arc::new(RecordingView::default());
        let mut reconciler = FavoritesReconciler::new(store.clone());
        reconciler.attach_view(&view);

        let handle = spawn_reconciler(reconciler);
        assert_eq!(handle.count().await.unwrap(), 3);

        store.push(ChangeNotification::Delete {
            id: "a".to_string(),
            position: 0,
        });
        handle.request_move(0, 1).await.unwrap();

        let reconciler = handle.shutdown().await.unwrap();
        let ids: Vec<_> = reconciler.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(
            view.replica_keys(),
            reconciler
                .entries()
                .iter()
                .map(|e| (e.id.clone(), e.order))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_actor_reports_rejected_move() {
        let store = FakeStore::with_entries(vec![fav("a", 1), fav("b", 2)]);
        store.state.lock().unwrap().fail_persist = true;

        let handle = spawn_reconciler(FavoritesReconciler::new(store));
        let result = handle.request_move(0, 1).await;

        assert!(matches!(result, Err(ReconcileError::MoveRejected { .. })));
        assert_eq!(handle.count().await.unwrap(), 2);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_keeps_serving_after_store_closes() {
        let store = FakeStore::with_entries(vec![fav("a", 1), fav("b", 2)]);
        let handle = spawn_reconciler(FavoritesReconciler::new(store.clone()));
        assert_eq!(handle.count().await.unwrap(), 2);

        store.state.lock().unwrap().sender = None;

        handle.set_editing(true).unwrap();
        handle.resync().await.unwrap();
        assert_eq!(handle.count().await.unwrap(), 2);

        let reconciler = handle.shutdown().await.unwrap();
        assert!(reconciler.is_editing());
    }
}
