use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionSettings};
use crate::decode::DecodeLevel;
use crate::retry::RetryStrategy;
#[cfg(feature = "serial")]
use crate::serial::{AsciiProtocol, RtuProtocol, SerialSettings};
use crate::tcp::{HostAddr, TcpProtocol};
use crate::types::UnitId;

mod handle;

pub use handle::Client;

/// Parameters that apply to a single request
#[derive(Clone, Debug)]
pub struct RequestParam {
    /// unit id of the addressed device
    pub id: UnitId,
    /// cancelling this token fails the request with [`crate::RequestError::Cancelled`]
    pub cancel: CancellationToken,
}

impl RequestParam {
    /// Create a request to `id` that is only cancelled by disposal
    pub fn new(id: UnitId) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel the request when `cancel` is cancelled
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }
}

/// Spawn a client for a Modbus TCP device
///
/// The returned client owns its connection and disposes it when dropped. Must be called from
/// within a Tokio runtime.
pub fn spawn_tcp_client(
    host: HostAddr,
    settings: ConnectionSettings,
    retry: Box<dyn RetryStrategy>,
    decode: DecodeLevel,
) -> Client {
    let connection = Connection::spawn_tcp(host, settings, retry, decode.physical);
    Client::new(
        Arc::new(connection),
        Some(Arc::new(TcpProtocol::new())),
        true,
        decode.app,
    )
}

/// Spawn a client for a Modbus RTU device on a serial line
///
/// The returned client owns its connection and disposes it when dropped. Must be called from
/// within a Tokio runtime.
#[cfg(feature = "serial")]
pub fn spawn_rtu_client(
    path: &str,
    serial: SerialSettings,
    settings: ConnectionSettings,
    retry: Box<dyn RetryStrategy>,
    decode: DecodeLevel,
) -> Client {
    let connection = Connection::spawn_serial(path, serial, settings, retry, decode.physical);
    Client::new(
        Arc::new(connection),
        Some(Arc::new(RtuProtocol::new())),
        true,
        decode.app,
    )
}

/// Spawn a client for a Modbus ASCII device on a serial line
///
/// The returned client owns its connection and disposes it when dropped. Must be called from
/// within a Tokio runtime.
#[cfg(feature = "serial")]
pub fn spawn_ascii_client(
    path: &str,
    serial: SerialSettings,
    settings: ConnectionSettings,
    retry: Box<dyn RetryStrategy>,
    decode: DecodeLevel,
) -> Client {
    let connection = Connection::spawn_serial(path, serial, settings, retry, decode.physical);
    Client::new(
        Arc::new(connection),
        Some(Arc::new(AsciiProtocol::new())),
        true,
        decode.app,
    )
}
