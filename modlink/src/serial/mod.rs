pub(crate) mod ascii;
pub(crate) mod rtu;

pub use ascii::AsciiProtocol;
pub use rtu::RtuProtocol;

/// Number of bits per character
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataBits {
    /// 5 bits per character
    Five,
    /// 6 bits per character
    Six,
    /// 7 bits per character, as used by Modbus ASCII
    Seven,
    /// 8 bits per character
    Eight,
}

/// Flow control modes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowControl {
    /// No flow control
    None,
    /// Flow control using XON/XOFF bytes
    Software,
    /// Flow control using RTS/CTS signals
    Hardware,
}

/// Number of stop bits
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit
    One,
    /// Two stop bits
    Two,
}

/// Parity checking modes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit
    None,
    /// Parity bit sets odd number of 1 bits
    Odd,
    /// Parity bit sets even number of 1 bits
    Even,
}

/// Serial port settings
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate of the port
    pub baud_rate: u32,
    /// Number of data bits
    pub data_bits: DataBits,
    /// Types of flow control
    pub flow_control: FlowControl,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity setting
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(from: DataBits) -> Self {
        match from {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(from: FlowControl) -> Self {
        match from {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(from: StopBits) -> Self {
        match from {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(from: Parity) -> Self {
        match from {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

impl std::fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data_bits = match self.data_bits {
            DataBits::Five => '5',
            DataBits::Six => '6',
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        write!(f, "{} {data_bits}{parity}{stop_bits}", self.baud_rate)
    }
}

/// Open the port in native async mode with the given settings
pub(crate) fn open(
    path: &str,
    settings: SerialSettings,
) -> std::io::Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    tracing::debug!("opening serial port: {} ({})", path, settings);

    let stream = tokio_serial::new(path, settings.baud_rate)
        .data_bits(settings.data_bits.into())
        .flow_control(settings.flow_control.into())
        .stop_bits(settings.stop_bits.into())
        .parity(settings.parity.into())
        .open_native_async()
        .map_err(|err| match err.kind {
            tokio_serial::ErrorKind::Io(kind) => std::io::Error::new(kind, err.description),
            _ => std::io::Error::new(std::io::ErrorKind::NotFound, err.description),
        })?;

    tracing::info!("opened serial port: {}", path);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_9600_8n1() {
        assert_eq!(SerialSettings::default().to_string(), "9600 8N1");
    }

    #[tokio::test]
    async fn opening_a_missing_port_fails() {
        assert!(open("/dev/modlink-does-not-exist", SerialSettings::default()).is_err());
    }
}
