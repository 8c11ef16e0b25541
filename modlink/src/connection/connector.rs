use std::time::Duration;

use crate::common::phys::PhysLayer;
#[cfg(feature = "serial")]
use crate::serial::SerialSettings;
use crate::tcp::HostAddr;

/// Knows how to open the physical link of a connection
pub(crate) enum Connector {
    Tcp(HostAddr),
    #[cfg(feature = "serial")]
    Serial(String, SerialSettings),
    #[cfg(test)]
    Mock(mock::MockConnector),
}

impl Connector {
    /// Make one connection attempt, bounded by the attempt timeout
    pub(crate) async fn connect(
        &mut self,
        attempt_timeout: Duration,
    ) -> std::io::Result<PhysLayer> {
        match self {
            Connector::Tcp(host) => connect_tcp(host, attempt_timeout).await,
            #[cfg(feature = "serial")]
            Connector::Serial(path, settings) => {
                let stream = crate::serial::open(path, *settings)?;
                Ok(PhysLayer::new_serial(stream))
            }
            #[cfg(test)]
            Connector::Mock(mock) => tokio::time::timeout(attempt_timeout, mock.connect())
                .await
                .map_err(|_| timed_out(&"mock"))?,
        }
    }
}

impl std::fmt::Display for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connector::Tcp(host) => write!(f, "tcp://{host}"),
            #[cfg(feature = "serial")]
            Connector::Serial(path, settings) => write!(f, "serial://{path} ({settings})"),
            #[cfg(test)]
            Connector::Mock(_) => f.write_str("mock"),
        }
    }
}

/// Resolve and try every candidate address, all within one attempt timeout
async fn connect_tcp(host: &HostAddr, attempt_timeout: Duration) -> std::io::Result<PhysLayer> {
    let deadline = tokio::time::Instant::now() + attempt_timeout;

    let candidates = tokio::time::timeout_at(deadline, host.resolve())
        .await
        .map_err(|_| timed_out(host))??;

    let mut last_error = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{host} did not resolve to any address"),
    );

    for addr in candidates {
        match tokio::time::timeout_at(deadline, tokio::net::TcpStream::connect(addr)).await {
            Ok(Ok(socket)) => {
                tracing::info!("connected to: {}", addr);
                return Ok(PhysLayer::new_tcp(socket));
            }
            Ok(Err(err)) => {
                tracing::debug!("unable to connect to {}: {}", addr, err);
                last_error = err;
            }
            Err(_) => {
                tracing::debug!("timed out connecting to {}", addr);
                last_error = timed_out(&addr);
            }
        }
    }

    Err(last_error)
}

fn timed_out(target: &dyn std::fmt::Display) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("timed out connecting to {target}"),
    )
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::common::phys::PhysLayer;

    enum Attempt {
        Link(tokio_test::io::Mock),
        Failure(std::io::ErrorKind),
        Hang,
    }

    /// Hands out scripted links, one per connection attempt
    #[derive(Clone, Default)]
    pub(crate) struct MockConnector {
        attempts: Arc<Mutex<VecDeque<Attempt>>>,
        connects: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// the next connection attempt succeeds with this link
        pub(crate) fn push_link(&self, mock: tokio_test::io::Mock) {
            self.push(Attempt::Link(mock));
        }

        /// the next connection attempt fails
        pub(crate) fn push_failure(&self, kind: std::io::ErrorKind) {
            self.push(Attempt::Failure(kind));
        }

        /// the next connection attempt never completes on its own
        pub(crate) fn push_hang(&self) {
            self.push(Attempt::Hang);
        }

        /// number of connection attempts made so far
        pub(crate) fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn push(&self, attempt: Attempt) {
            self.attempts.lock().unwrap().push_back(attempt);
        }

        pub(super) async fn connect(&self) -> std::io::Result<PhysLayer> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let attempt = self.attempts.lock().unwrap().pop_front();
            match attempt {
                Some(Attempt::Link(mock)) => Ok(PhysLayer::new_mock(mock)),
                Some(Attempt::Failure(kind)) => Err(kind.into()),
                Some(Attempt::Hang) => std::future::pending().await,
                None => Err(std::io::ErrorKind::ConnectionRefused.into()),
            }
        }
    }
}
