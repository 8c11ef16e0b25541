use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::common::phys::PhysLayer;
use crate::common::queue::RequestQueue;
use crate::connection::connector::Connector;
use crate::connection::item::{QueueItem, ResponseResult};
use crate::connection::{ConnectionSettings, ConnectionState, IdleTimeout};
use crate::constants::limits::MAX_RESPONSE_LENGTH;
use crate::decode::PhysDecodeLevel;
use crate::error::{FrameParseError, RequestError};
use crate::retry::RetryStrategy;

const READ_BUFFER_SIZE: usize = 256;

enum Event {
    Request(Arc<QueueItem>),
    IdleTimeout,
    Disconnect,
    Shutdown,
}

/// Everything shared between a `Connection` handle and its task
pub(crate) struct Shared {
    pub(crate) queue: RequestQueue<Arc<QueueItem>>,
    pub(crate) disposed: CancellationToken,
    pub(crate) disconnect: Notify,
}

/// The single consumer of a connection's queue and sole owner of its physical link
///
/// Connecting, exchanging, idle-closing and explicit disconnects all happen inside this task,
/// one after the other, so no two of them can ever overlap.
pub(crate) struct ConnectionTask {
    connector: Connector,
    settings: ConnectionSettings,
    retry: Box<dyn RetryStrategy>,
    decode: PhysDecodeLevel,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
    link: Option<PhysLayer>,
    last_activity: Instant,
    seq: u64,
}

impl ConnectionTask {
    pub(crate) fn new(
        connector: Connector,
        settings: ConnectionSettings,
        retry: Box<dyn RetryStrategy>,
        decode: PhysDecodeLevel,
        shared: Arc<Shared>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            connector,
            settings,
            retry,
            decode,
            shared,
            state,
            link: None,
            last_activity: Instant::now(),
            seq: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let event = next_event(&self.shared, self.idle_deadline()).await;
            match event {
                Event::Request(item) => self.process(item).await,
                Event::IdleTimeout => self.close("idle timeout"),
                Event::Disconnect => self.close("disconnect requested"),
                Event::Shutdown => break,
            }
        }

        self.shutdown();
    }

    fn idle_deadline(&self) -> Option<Instant> {
        match (&self.link, self.settings.idle_timeout) {
            (Some(_), IdleTimeout::After(timeout)) => Some(self.last_activity + timeout),
            _ => None,
        }
    }

    async fn process(&mut self, item: Arc<QueueItem>) {
        // the caller gave up before the request reached the link
        if item.is_cancelled() {
            item.complete(Err(RequestError::Cancelled));
            return;
        }

        self.seq = self.seq.wrapping_add(1);
        let span = tracing::info_span!("Request", seq = self.seq);

        let disposed = self.shared.disposed.clone();
        let result = tokio::select! {
            _ = disposed.cancelled() => Err(RequestError::Shutdown),
            result = self.connect_and_exchange(&item).instrument(span) => result,
        };

        if let Err(err) = &result {
            // the link is in an unknown state after these errors
            if err.is_transport() || matches!(err, RequestError::BadFrame(_)) {
                tracing::warn!("closing link: {}", err);
                self.close_link();
            }
        }

        item.complete(result);
        self.last_activity = Instant::now();

        if self.settings.idle_timeout == IdleTimeout::Immediate {
            self.close("idle timeout");
        }
    }

    async fn connect_and_exchange(&mut self, item: &QueueItem) -> ResponseResult {
        if self.link.is_none() {
            let link = tokio::select! {
                _ = item.cancelled() => None,
                link = self.connect() => Some(link),
            };

            match link {
                Some(link) => self.link = Some(link?),
                None => {
                    tracing::info!("request cancelled while connecting");
                    self.set_state(ConnectionState::Disconnected);
                    return Err(RequestError::Cancelled);
                }
            }
        }

        // the caller may have given up while the link was being opened
        if item.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        let link = self.link.as_mut().ok_or(RequestError::NoConnection)?;
        exchange(link, item, &self.settings, self.decode).await
    }

    /// Connect, backing off between failed attempts, until connected or the connect timeout
    /// elapses
    ///
    /// Attempts and delays are clipped to whatever remains of the connect timeout. A last
    /// attempt is made when the deadline is reached.
    async fn connect(&mut self) -> Result<PhysLayer, RequestError> {
        let deadline = self.settings.connect_timeout.map(|x| Instant::now() + x);

        loop {
            self.set_state(ConnectionState::Connecting);

            let attempt_timeout = match deadline {
                Some(deadline) => remaining(deadline).min(self.settings.attempt_timeout),
                None => self.settings.attempt_timeout,
            };

            match self.connector.connect(attempt_timeout).await {
                Ok(link) => {
                    self.retry.reset();
                    self.last_activity = Instant::now();
                    self.set_state(ConnectionState::Connected);
                    return Ok(link);
                }
                Err(err) => {
                    let mut delay = self.retry.after_failed_connect();

                    if let Some(deadline) = deadline {
                        let left = remaining(deadline);
                        if left.is_zero() {
                            tracing::warn!("{} - connect timeout exceeded", err);
                            self.set_state(ConnectionState::Disconnected);
                            return Err(RequestError::ConnectTimeout);
                        }
                        delay = delay.min(left);
                    }

                    tracing::warn!(
                        "failed to connect to {}: {} - waiting {} ms before next attempt",
                        self.connector,
                        err,
                        delay.as_millis()
                    );
                    self.set_state(ConnectionState::WaitAfterFailedConnect(delay));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn close(&mut self, reason: &str) {
        if self.link.is_some() {
            tracing::info!("closing link: {}", reason);
            self.close_link();
        }
    }

    fn close_link(&mut self) {
        self.link = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn shutdown(&mut self) {
        self.link = None;
        self.set_state(ConnectionState::Shutdown);

        if !self.shared.queue.is_empty() {
            tracing::warn!("failing {} queued requests", self.shared.queue.len());
        }

        for item in self.shared.queue.drain() {
            item.complete(Err(RequestError::Shutdown));
        }

        tracing::info!("connection shut down");
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!("{}", state);
        }
    }
}

async fn next_event(shared: &Shared, idle_deadline: Option<Instant>) -> Event {
    tokio::select! {
        biased;
        _ = shared.disposed.cancelled() => Event::Shutdown,
        _ = shared.disconnect.notified() => Event::Disconnect,
        item = shared.queue.dequeue(&shared.disposed) => match item {
            Some(item) => Event::Request(item),
            None => Event::Shutdown,
        },
        _ = sleep_until(idle_deadline) => Event::IdleTimeout,
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Write the request, then read until the response is complete
async fn exchange(
    link: &mut PhysLayer,
    item: &QueueItem,
    settings: &ConnectionSettings,
    decode: PhysDecodeLevel,
) -> ResponseResult {
    link.write(&item.request, settings.write_timeout, decode)
        .await?;

    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut response = Vec::new();

    loop {
        let count = link.read(&mut buffer, settings.read_timeout, decode).await?;
        if count == 0 {
            return Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof));
        }

        response.extend_from_slice(&buffer[..count]);

        if (item.is_complete)(&response) {
            return Ok(response);
        }

        if response.len() > MAX_RESPONSE_LENGTH {
            return Err(
                FrameParseError::FrameLengthTooBig(response.len(), MAX_RESPONSE_LENGTH).into(),
            );
        }
    }
}
