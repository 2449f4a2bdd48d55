//! Observer list for repository changes.
//!
//! Callbacks are only ever invoked from jobs on the engine's coordinator, so
//! a listener never sees two notifications at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub trait RepositoryListener: Send + Sync {
    /// A refresh cycle dispatched `total` download/upload items.
    fn update_started(&self, _total: usize) {}

    fn update_progress(&self, _done: usize, _total: usize) {}

    /// Local state was reloaded.
    fn updated(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn RepositoryListener>)>>,
}

impl Listeners {
    pub fn add(&self, listener: Arc<dyn RepositoryListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn get(&self, id: ListenerId) -> Option<Arc<dyn RepositoryListener>> {
        self.lock()
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, listener)| Arc::clone(listener))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Call `f` on a snapshot so a listener may unsubscribe from its callback.
    pub fn notify(&self, f: impl Fn(&dyn RepositoryListener)) {
        let snapshot: Vec<_> = self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            f(listener.as_ref());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<dyn RepositoryListener>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl RepositoryListener for Counter {
        fn updated(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        let listeners = Listeners::default();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());

        let first_id = listeners.add(first.clone());
        listeners.add(second.clone());
        listeners.notify(|l| l.updated());

        assert!(listeners.remove(first_id));
        assert!(!listeners.remove(first_id));
        listeners.notify(|l| l.updated());

        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 2);
        assert_eq!(listeners.len(), 1);
    }
}
