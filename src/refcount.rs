use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;

type CountCallback = Arc<dyn Fn(i64) + Send + Sync>;
type ActivityCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Shared count of attached consumers.
///
/// Producers use the 0 ↔ 1 boundary to decide whether sampling should run at
/// all. Clones share the same count; independent counters are independent.
#[derive(Clone, Default)]
pub struct RefCounter {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: AtomicI64,
    // Held across a count change and its notifications, so callbacks observe
    // transitions in the order they happened. Re-entrant for nested attach.
    transition: ReentrantMutex<()>,
    on_count: Mutex<Vec<CountCallback>>,
    on_activity: Mutex<Vec<ActivityCallback>>,
}

/// One attached consumer. Detaches on `dispose` or drop, whichever comes first.
#[must_use = "dropping an Attachment detaches immediately"]
pub struct Attachment {
    counter: Option<RefCounter>,
}

impl RefCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> Attachment {
        self.transition(1);
        Attachment {
            counter: Some(self.clone()),
        }
    }

    /// Called with the new count after every attach and detach.
    pub fn on_count_change(&self, callback: impl Fn(i64) + Send + Sync + 'static) {
        self.inner.on_count.lock().push(Arc::new(callback));
    }

    /// Called with `true` on 0 → 1 and `false` on 1 → 0 only.
    pub fn on_activity_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.on_activity.lock().push(Arc::new(callback));
    }

    /// The activity gate as a `watch`, seeded with the current state.
    ///
    /// Seeding and registration happen under the transition lock, so no
    /// boundary can slip in between them.
    pub fn watch_activity(&self) -> watch::Receiver<bool> {
        let _guard = self.inner.transition.lock();
        let (tx, rx) = watch::channel(self.is_active());
        self.on_activity_change(move |active| {
            let _ = tx.send(active);
        });
        rx
    }

    pub fn get_count(&self) -> i64 {
        self.inner.count.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.get_count() > 0
    }

    fn detach(&self) {
        self.transition(-1);
    }

    fn transition(&self, delta: i64) {
        let _guard = self.inner.transition.lock();
        let count = self.inner.count.fetch_add(delta, Ordering::SeqCst) + delta;
        let boundary = (delta > 0 && count == 1) || (delta < 0 && count == 0);

        // Snapshot the lists so callbacks may attach or register re-entrantly.
        let on_count: Vec<_> = self.inner.on_count.lock().clone();
        for cb in &on_count {
            cb(count);
        }
        if boundary {
            let on_activity: Vec<_> = self.inner.on_activity.lock().clone();
            // Re-read: a re-entrant callback may already have crossed back.
            for cb in &on_activity {
                cb(self.is_active());
            }
        }
    }
}

impl std::fmt::Debug for RefCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCounter")
            .field("count", &self.get_count())
            .finish()
    }
}

impl Attachment {
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(counter) = self.counter.take() {
            counter.detach();
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("attached", &self.counter.is_some())
            .finish()
    }
}
