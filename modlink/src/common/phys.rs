use std::fmt::Write;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::decode::PhysDecodeLevel;
use crate::error::RequestError;

/// An open duplex byte stream to a device
pub(crate) struct PhysLayer {
    layer: PhysLayerImpl,
}

// encapsulates all possible physical layers as an enum
enum PhysLayerImpl {
    Tcp(tokio::net::TcpStream),
    #[cfg(feature = "serial")]
    Serial(
        tokio_serial::SerialStream,
        Duration,
        Option<tokio::time::Instant>,
    ),
    #[cfg(test)]
    Mock(tokio_test::io::Mock),
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.layer {
            PhysLayerImpl::Tcp(_) => f.write_str("Tcp"),
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(_, _, _) => f.write_str("Serial"),
            #[cfg(test)]
            PhysLayerImpl::Mock(_) => f.write_str("Mock"),
        }
    }
}

impl PhysLayer {
    pub(crate) fn new_tcp(socket: tokio::net::TcpStream) -> Self {
        Self {
            layer: PhysLayerImpl::Tcp(socket),
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(stream: tokio_serial::SerialStream) -> Self {
        let inter_frame_delay = calculate_inter_frame_delay(&stream);
        Self {
            layer: PhysLayerImpl::Serial(stream, inter_frame_delay, None),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_mock(mock: tokio_test::io::Mock) -> Self {
        Self {
            layer: PhysLayerImpl::Mock(mock),
        }
    }

    /// Read whatever is available, bounded by an optional timeout
    pub(crate) async fn read(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
        decode_level: PhysDecodeLevel,
    ) -> Result<usize, RequestError> {
        let length = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_inner(buffer))
                .await
                .map_err(|_| RequestError::ResponseTimeout)??,
            None => self.read_inner(buffer).await?,
        };

        if decode_level.enabled() {
            if let Some(x) = buffer.get(0..length) {
                tracing::info!("PHYS RX - {}", PhysDisplay::new(decode_level, x))
            }
        }

        Ok(length)
    }

    /// Write the complete frame, bounded by an optional timeout
    pub(crate) async fn write(
        &mut self,
        data: &[u8],
        timeout: Option<Duration>,
        decode_level: PhysDecodeLevel,
    ) -> Result<(), RequestError> {
        if decode_level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(decode_level, data));
        }

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.write_inner(data))
                .await
                .map_err(|_| RequestError::ResponseTimeout)??,
            None => self.write_inner(data).await?,
        }

        Ok(())
    }

    async fn read_inner(&mut self, buffer: &mut [u8]) -> Result<usize, std::io::Error> {
        match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.read(buffer).await,
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x, _, last_activity) => {
                let length = x.read(buffer).await?;
                *last_activity = Some(tokio::time::Instant::now());
                Ok(length)
            }
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.read(buffer).await,
        }
    }

    async fn write_inner(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        match &mut self.layer {
            PhysLayerImpl::Tcp(x) => x.write_all(data).await,
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x, inter_frame_delay, last_activity) => {
                // frames on a serial line must be separated by at least 3.5 character times
                if let Some(last_activity) = last_activity {
                    tokio::time::sleep_until(*last_activity + *inter_frame_delay).await;
                }
                x.write_all(data).await?;
                *last_activity = Some(tokio::time::Instant::now());
                Ok(())
            }
            #[cfg(test)]
            PhysLayerImpl::Mock(x) => x.write_all(data).await,
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl<'a> std::fmt::Display for PhysDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serial")]
fn calculate_inter_frame_delay(serial: &tokio_serial::SerialStream) -> Duration {
    use tokio_serial::SerialPort;

    match serial.baud_rate() {
        Ok(baud_rate) => inter_frame_delay(baud_rate),
        Err(_) => {
            tracing::warn!(
                "unable to determine the baud rate, defaulting to {} us",
                MIN_INTER_FRAME_DELAY.as_micros()
            );
            MIN_INTER_FRAME_DELAY
        }
    }
}

// above this baud rate the delay is fixed
#[cfg(any(feature = "serial", test))]
const MAX_BAUD_RATE: u32 = 19200;
#[cfg(any(feature = "serial", test))]
const MIN_INTER_FRAME_DELAY: Duration = Duration::from_micros(1750);

/// 3.5 character times of 11 bits each, or a fixed 1.75 ms at high baud rates
#[cfg(any(feature = "serial", test))]
pub(crate) fn inter_frame_delay(baud_rate: u32) -> Duration {
    const NUM_BITS_IN_CHAR: u64 = 11;

    if baud_rate == 0 || baud_rate > MAX_BAUD_RATE {
        return MIN_INTER_FRAME_DELAY;
    }

    let character_time = Duration::from_secs(NUM_BITS_IN_CHAR) / baud_rate;
    35 * character_time / 10
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}
