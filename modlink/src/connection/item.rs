use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::RequestError;

pub(crate) type ResponseResult = Result<Vec<u8>, RequestError>;

pub(crate) type IsComplete = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// A request waiting in, or taken from, the queue of a connection
pub(crate) struct QueueItem {
    pub(crate) request: Vec<u8>,
    pub(crate) is_complete: IsComplete,
    cancel: CancellationToken,
    reply: Mutex<Option<oneshot::Sender<ResponseResult>>>,
}

impl QueueItem {
    pub(crate) fn new(
        request: Vec<u8>,
        is_complete: IsComplete,
        cancel: CancellationToken,
    ) -> (Self, oneshot::Receiver<ResponseResult>) {
        let (tx, rx) = oneshot::channel();
        let item = Self {
            request,
            is_complete,
            cancel,
            reply: Mutex::new(Some(tx)),
        };
        (item, rx)
    }

    /// true if the caller gave up on this request
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the caller gives up on this request
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Deliver the result. Only the first call has any effect, later ones return false.
    pub(crate) fn complete(&self, result: ResponseResult) -> bool {
        let sender = self
            .reply
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match sender {
            // the receiver may already be gone if the caller stopped waiting
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

// items are identified by where they live, not by their contents
impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
