//! An asynchronous [Modbus](http://modbus.org/) master (client) built on
//! [Tokio](https://docs.rs/tokio) and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * Three wire formats behind one [`Protocol`] trait: Modbus TCP, RTU and ASCII
//! * Automatic connection management with configurable reconnect strategy
//! * Idle links are closed and transparently re-opened on the next request
//! * Requests are queued and executed strictly one at a time per connection
//! * Cooperative cancellation of individual requests
//! * Panic-free parsing
//!
//! # Supported Functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//! * Write Multiple Coils
//! * Write Multiple Registers
//! * Read Device Identification (MEI 0x0E), including multi-page replies
//!
//! # Example
//!
//! ```no_run
//! use modlink::client::*;
//! use modlink::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = spawn_tcp_client(
//!         HostAddr::dns("plc.local".to_string(), 502),
//!         ConnectionSettings::default(),
//!         default_retry_strategy(),
//!         DecodeLevel::default(),
//!     );
//!
//!     let param = RequestParam::new(UnitId::new(1));
//!     for register in client.read_holding_registers(param, 0, 4).await? {
//!         println!("{}: {}", register.address, register.as_u16());
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Client API: typed Modbus operations on top of a [`Connection`]
pub mod client;

mod common;
mod connection;
mod constants;
mod decode;
mod device;
mod error;
mod exception;
mod protocol;
mod retry;
#[cfg(feature = "serial")]
mod serial;
mod tcp;
mod types;

pub use crate::common::checksum::{crc16, lrc8};
pub use crate::connection::*;
pub use crate::decode::*;
pub use crate::device::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::protocol::*;
pub use crate::retry::*;
#[cfg(feature = "serial")]
pub use crate::serial::*;
pub use crate::tcp::*;
pub use crate::types::*;

// tokio-util's cancellation token is part of the public API
pub use tokio_util::sync::CancellationToken;
