use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::common::queue::RequestQueue;
use crate::decode::PhysDecodeLevel;
use crate::error::RequestError;
use crate::retry::RetryStrategy;
#[cfg(feature = "serial")]
use crate::serial::SerialSettings;
use crate::tcp::HostAddr;

pub(crate) mod connector;
pub(crate) mod item;
mod task;

use connector::Connector;
use item::QueueItem;
use task::{ConnectionTask, Shared};

/// When an unused link is closed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdleTimeout {
    /// close the link right after every exchange
    Immediate,
    /// close the link once nothing was exchanged for this long
    After(Duration),
    /// keep the link open until a fault or an explicit disconnect
    Never,
}

impl Default for IdleTimeout {
    fn default() -> Self {
        IdleTimeout::After(Duration::from_secs(6))
    }
}

/// Timeouts governing a connection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// when to close an unused link
    pub idle_timeout: IdleTimeout,
    /// upper bound on the total time spent (re-)connecting before the pending request fails,
    /// `None` retries forever
    pub connect_timeout: Option<Duration>,
    /// upper bound on a single connection attempt
    pub attempt_timeout: Duration,
    /// upper bound on a single read from the link
    pub read_timeout: Option<Duration>,
    /// upper bound on writing a request to the link
    pub write_timeout: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: IdleTimeout::default(),
            connect_timeout: None,
            attempt_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// State of the physical link of a [`Connection`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// no link is open, the next request opens one
    Disconnected,
    /// a connection attempt is in progress
    Connecting,
    /// the last attempt failed, the next one starts after the delay
    WaitAfterFailedConnect(Duration),
    /// the link is open
    Connected,
    /// the connection was disposed and accepts no further requests
    Shutdown,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::WaitAfterFailedConnect(delay) => {
                write!(f, "waiting {} ms after failed connect", delay.as_millis())
            }
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// A queue of raw request/response exchanges over one physical link
///
/// Requests are executed strictly one at a time, in the order they were submitted, by a
/// background task that also owns the link. The link is opened on demand, re-opened after a
/// fault and closed when idle.
///
/// Dropping the `Connection` disposes it.
pub struct Connection {
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
}

impl Connection {
    /// Spawn a connection to a Modbus TCP device
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_tcp(
        host: HostAddr,
        settings: ConnectionSettings,
        retry: Box<dyn RetryStrategy>,
        decode: PhysDecodeLevel,
    ) -> Self {
        Self::spawn(Connector::Tcp(host), settings, retry, decode)
    }

    /// Spawn a connection to a device on a serial line
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "serial")]
    pub fn spawn_serial(
        path: &str,
        serial: SerialSettings,
        settings: ConnectionSettings,
        retry: Box<dyn RetryStrategy>,
        decode: PhysDecodeLevel,
    ) -> Self {
        Self::spawn(
            Connector::Serial(path.to_string(), serial),
            settings,
            retry,
            decode,
        )
    }

    pub(crate) fn spawn(
        connector: Connector,
        settings: ConnectionSettings,
        retry: Box<dyn RetryStrategy>,
        decode: PhysDecodeLevel,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: RequestQueue::new(),
            disposed: CancellationToken::new(),
            disconnect: Notify::new(),
        });
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let span = tracing::info_span!("Modbus-Client", "endpoint" = %connector);
        let task = ConnectionTask::new(connector, settings, retry, decode, shared.clone(), tx);

        tokio::spawn(task.run().instrument(span));

        Self { shared, state: rx }
    }

    /// Send `request` and collect the response until `is_complete` returns true for the bytes
    /// received so far
    ///
    /// Cancelling `cancel` fails only this request with [`RequestError::Cancelled`]. If the
    /// request is still queued it never reaches the link. Disposing the connection fails it
    /// with [`RequestError::Shutdown`].
    pub async fn invoke<F>(
        &self,
        request: Vec<u8>,
        is_complete: F,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RequestError>
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return Err(RequestError::Shutdown);
        }

        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        let (item, reply) = QueueItem::new(request, Box::new(is_complete), cancel.clone());
        let item = Arc::new(item);
        self.shared.queue.enqueue(item.clone());

        tokio::select! {
            biased;
            result = reply => result.unwrap_or(Err(RequestError::Shutdown)),
            _ = cancel.cancelled() => {
                self.shared.queue.remove(&item);
                item.complete(Err(RequestError::Cancelled));
                Err(RequestError::Cancelled)
            }
            _ = self.shared.disposed.cancelled() => {
                self.shared.queue.remove(&item);
                item.complete(Err(RequestError::Shutdown));
                Err(RequestError::Shutdown)
            }
        }
    }

    /// Close the link once the exchange in progress, if any, is done. The next request
    /// reconnects.
    pub fn disconnect(&self) {
        self.shared.disconnect.notify_one();
    }

    /// Current state of the link
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch the state of the link
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Fail every outstanding and future request with [`RequestError::Shutdown`] and close the
    /// link. Calling this more than once has no further effect.
    pub fn dispose(&self) {
        if !self.shared.disposed.is_cancelled() {
            tracing::debug!("disposing connection");
            self.shared.disposed.cancel();
        }
    }

    /// true once [`Connection::dispose`] was called
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.is_cancelled()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use tokio_test::io::Builder;

    use super::connector::mock::MockConnector;
    use super::*;
    use crate::retry::doubling_retry_strategy;

    fn spawn_mock(mock: &MockConnector, settings: ConnectionSettings) -> Connection {
        Connection::spawn(
            Connector::Mock(mock.clone()),
            settings,
            doubling_retry_strategy(Duration::from_secs(1), Duration::from_secs(60)),
            PhysDecodeLevel::Data,
        )
    }

    fn length_is(expected: usize) -> impl Fn(&[u8]) -> bool + Send + Sync + 'static {
        move |response: &[u8]| response.len() >= expected
    }

    #[tokio::test]
    async fn invoke_returns_the_response() {
        let mock = MockConnector::new();
        mock.push_link(Builder::new().write(&[1, 2, 3]).read(&[9, 8, 7]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());

        let response = connection
            .invoke(vec![1, 2, 3], length_is(3), &CancellationToken::new())
            .await;

        assert_eq!(response, Ok(vec![9, 8, 7]));
        assert_eq!(mock.connects(), 1);
        assert_eq!(connection.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn responses_are_accumulated_across_reads() {
        let mock = MockConnector::new();
        mock.push_link(
            Builder::new()
                .write(&[1])
                .read(&[9])
                .read(&[8, 7])
                .read(&[6])
                .build(),
        );
        let connection = spawn_mock(&mock, ConnectionSettings::default());

        let response = connection
            .invoke(vec![1], length_is(4), &CancellationToken::new())
            .await;

        assert_eq!(response, Ok(vec![9, 8, 7, 6]));
    }

    #[tokio::test]
    async fn requests_are_executed_in_order_on_one_link() {
        let mock = MockConnector::new();
        mock.push_link(
            Builder::new()
                .write(&[1])
                .read(&[11])
                .write(&[2])
                .read(&[12])
                .write(&[3])
                .read(&[13])
                .build(),
        );
        let connection = Arc::new(spawn_mock(&mock, ConnectionSettings::default()));

        let token = CancellationToken::new();
        let (a, b, c) = tokio::join!(
            connection.invoke(vec![1], length_is(1), &token),
            connection.invoke(vec![2], length_is(1), &token),
            connection.invoke(vec![3], length_is(1), &token),
        );

        assert_eq!(a, Ok(vec![11]));
        assert_eq!(b, Ok(vec![12]));
        assert_eq!(c, Ok(vec![13]));
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test]
    async fn io_fault_fails_the_request_and_reconnects_for_the_next() {
        let mock = MockConnector::new();
        mock.push_link(
            Builder::new()
                .write(&[1])
                .read_error(std::io::Error::from(ErrorKind::ConnectionReset))
                .build(),
        );
        mock.push_link(Builder::new().write(&[2]).read(&[5]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());
        let token = CancellationToken::new();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Err(RequestError::Io(ErrorKind::ConnectionReset))
        );
        assert_eq!(
            connection.invoke(vec![2], length_is(1), &token).await,
            Ok(vec![5])
        );
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test]
    async fn end_of_stream_faults_the_request() {
        let mock = MockConnector::new();
        mock.push_link(Builder::new().write(&[1]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());

        assert_eq!(
            connection
                .invoke(vec![1], length_is(1), &CancellationToken::new())
                .await,
            Err(RequestError::Io(ErrorKind::UnexpectedEof))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_are_retried_with_backoff() {
        let mock = MockConnector::new();
        mock.push_failure(ErrorKind::ConnectionRefused);
        mock.push_failure(ErrorKind::ConnectionRefused);
        mock.push_link(Builder::new().write(&[1]).read(&[2]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());

        let start = tokio::time::Instant::now();
        let response = connection
            .invoke(vec![1], length_is(1), &CancellationToken::new())
            .await;

        assert_eq!(response, Ok(vec![2]));
        assert_eq!(mock.connects(), 3);
        // 1 s after the first failure, 2 s after the second
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_fails_the_request() {
        let mock = MockConnector::new();
        let settings = ConnectionSettings {
            connect_timeout: Some(Duration::from_millis(2500)),
            ..Default::default()
        };
        let connection = spawn_mock(&mock, settings);

        let start = tokio::time::Instant::now();
        assert_eq!(
            connection
                .invoke(vec![1], length_is(1), &CancellationToken::new())
                .await,
            Err(RequestError::ConnectTimeout)
        );
        // attempts at 0 s and 1 s, then a last one when the budget runs out at 2.5 s
        assert_eq!(mock.connects(), 3);
        assert!(start.elapsed() >= Duration::from_millis(2500));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_bounds_a_hanging_attempt() {
        let mock = MockConnector::new();
        mock.push_hang();
        let settings = ConnectionSettings {
            connect_timeout: Some(Duration::from_secs(2)),
            attempt_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let connection = spawn_mock(&mock, settings);

        let start = tokio::time::Instant::now();
        assert_eq!(
            connection
                .invoke(vec![1], length_is(1), &CancellationToken::new())
                .await,
            Err(RequestError::ConnectTimeout)
        );
        assert!(start.elapsed() <= Duration::from_secs(2));
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_while_reconnecting_keeps_the_request_off_the_next_link() {
        let mock = MockConnector::new();
        mock.push_failure(ErrorKind::ConnectionRefused);
        // only the second request may ever be written
        mock.push_link(Builder::new().write(&[2]).read(&[12]).build());
        let connection = Arc::new(spawn_mock(&mock, ConnectionSettings::default()));

        let token = CancellationToken::new();
        let first = {
            let connection = connection.clone();
            let token = token.clone();
            tokio::spawn(async move { connection.invoke(vec![1], length_is(1), &token).await })
        };
        // the first attempt failed and the task is waiting 1 s before the next one
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        assert_eq!(first.await.unwrap(), Err(RequestError::Cancelled));
        assert_eq!(
            connection
                .invoke(vec![2], length_is(1), &CancellationToken::new())
                .await,
            Ok(vec![12])
        );
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_queued_request_keeps_it_off_the_link() {
        let mock = MockConnector::new();
        mock.push_link(
            Builder::new()
                .write(&[1])
                .wait(Duration::from_secs(1))
                .read(&[11])
                .write(&[3])
                .read(&[13])
                .build(),
        );
        let connection = Arc::new(spawn_mock(&mock, ConnectionSettings::default()));

        let first = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .invoke(vec![1], length_is(1), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let token = CancellationToken::new();
        let second = {
            let connection = connection.clone();
            let token = token.clone();
            tokio::spawn(async move { connection.invoke(vec![2], length_is(1), &token).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        assert_eq!(second.await.unwrap(), Err(RequestError::Cancelled));
        assert_eq!(first.await.unwrap(), Ok(vec![11]));
        assert_eq!(
            connection
                .invoke(vec![3], length_is(1), &CancellationToken::new())
                .await,
            Ok(vec![13])
        );
    }

    #[tokio::test]
    async fn pre_cancelled_requests_never_connect() {
        let mock = MockConnector::new();
        let connection = spawn_mock(&mock, ConnectionSettings::default());
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Err(RequestError::Cancelled)
        );
        assert_eq!(mock.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_fails_outstanding_and_future_requests() {
        let mock = MockConnector::new();
        // every attempt fails, so the request waits in the backoff loop
        let connection = Arc::new(spawn_mock(&mock, ConnectionSettings::default()));

        let pending = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .invoke(vec![1], length_is(1), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        connection.dispose();
        connection.dispose();

        assert_eq!(pending.await.unwrap(), Err(RequestError::Shutdown));
        assert_eq!(
            connection
                .invoke(vec![2], length_is(1), &CancellationToken::new())
                .await,
            Err(RequestError::Shutdown)
        );

        let mut state = connection.subscribe();
        state
            .wait_for(|x| *x == ConnectionState::Shutdown)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_link_is_closed_and_reopened_on_demand() {
        let mock = MockConnector::new();
        mock.push_link(Builder::new().write(&[1]).read(&[11]).build());
        mock.push_link(Builder::new().write(&[2]).read(&[12]).build());
        let settings = ConnectionSettings {
            idle_timeout: IdleTimeout::After(Duration::from_secs(1)),
            ..Default::default()
        };
        let connection = spawn_mock(&mock, settings);
        let token = CancellationToken::new();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Ok(vec![11])
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        assert_eq!(
            connection.invoke(vec![2], length_is(1), &token).await,
            Ok(vec![12])
        );
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test]
    async fn immediate_idle_timeout_closes_after_every_exchange() {
        let mock = MockConnector::new();
        mock.push_link(Builder::new().write(&[1]).read(&[11]).build());
        mock.push_link(Builder::new().write(&[2]).read(&[12]).build());
        let settings = ConnectionSettings {
            idle_timeout: IdleTimeout::Immediate,
            ..Default::default()
        };
        let connection = spawn_mock(&mock, settings);
        let token = CancellationToken::new();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Ok(vec![11])
        );
        assert_eq!(
            connection.invoke(vec![2], length_is(1), &token).await,
            Ok(vec![12])
        );
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test]
    async fn explicit_disconnect_closes_the_link() {
        let mock = MockConnector::new();
        mock.push_link(Builder::new().write(&[1]).read(&[11]).build());
        mock.push_link(Builder::new().write(&[2]).read(&[12]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());
        let token = CancellationToken::new();
        let mut state = connection.subscribe();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Ok(vec![11])
        );
        connection.disconnect();
        state
            .wait_for(|x| *x == ConnectionState::Disconnected)
            .await
            .unwrap();

        assert_eq!(
            connection.invoke(vec![2], length_is(1), &token).await,
            Ok(vec![12])
        );
        assert_eq!(mock.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_closes_the_link() {
        let mock = MockConnector::new();
        mock.push_link(
            Builder::new()
                .write(&[1])
                .wait(Duration::from_secs(5))
                .build(),
        );
        mock.push_link(Builder::new().write(&[2]).read(&[12]).build());
        let connection = spawn_mock(&mock, ConnectionSettings::default());
        let token = CancellationToken::new();

        assert_eq!(
            connection.invoke(vec![1], length_is(1), &token).await,
            Err(RequestError::ResponseTimeout)
        );
        assert_eq!(
            connection.invoke(vec![2], length_is(1), &token).await,
            Ok(vec![12])
        );
        assert_eq!(mock.connects(), 2);
    }
}
