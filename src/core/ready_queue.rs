use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// FIFO task queue shared between producers and waiting consumers.
///
/// Used for the space's global ready queue and for each computer's local
/// queue. Batch operations take the lock once, so a batch is admitted or
/// drained atomically with respect to other callers.
pub struct ReadyQueue<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append an item and wake one waiter
    pub fn push(&self, item: T) {
        self.queue.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Append every item under a single lock acquisition
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) {
        let added = {
            let mut queue = self.queue.lock();
            let before = queue.len();
            queue.extend(items);
            queue.len() - before
        };
        for _ in 0..added {
            self.notify.notify_one();
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    /// Remove up to `max` items from the head, in order
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Pop the head, waiting until an item is available
    pub async fn pop_wait(&self) -> T {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Wait until something is pushed. A push that happened while nobody
    /// was waiting completes the next wait immediately.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Remove and return everything
    pub fn clear(&self) -> Vec<T> {
        self.queue.lock().drain(..).collect()
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
