use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// FIFO shared by many producers and a single consumer
///
/// Items that have not been dequeued yet may be removed from anywhere in the queue without
/// disturbing the order of the others.
pub(crate) struct RequestQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    // the lock is never held across an await and no code panics while holding it
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an item to the back of the queue and wake the consumer
    pub(crate) fn enqueue(&self, item: T) {
        self.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Remove the item at the front of the queue without waiting
    pub(crate) fn try_dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for an item, returning `None` if the token is cancelled first
    pub(crate) async fn dequeue(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            // register interest before checking so an enqueue in between is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Remove every pending item, oldest first
    pub(crate) fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: PartialEq> RequestQueue<T> {
    /// Remove an item that has not been dequeued yet. Returns false if it was not found.
    pub(crate) fn remove(&self, item: &T) -> bool {
        let mut items = self.lock();
        match items.iter().position(|x| x == item) {
            Some(index) => items.remove(index).is_some(),
            None => false,
        }
    }
}
