use crate::constants::exceptions;

/// Exception codes a device may report in place of a normal response
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub enum ExceptionCode {
    /// The function code received in the query is not an allowable action for the device
    IllegalFunction,
    /// The data address received in the query is not an allowable address for the device
    IllegalDataAddress,
    /// A value contained in the request is not an allowable value for the device
    IllegalDataValue,
    /// An unrecoverable error occurred while the device was attempting to perform the requested
    /// action
    SlaveDeviceFailure,
    /// The device has accepted the request and is processing it, but a long duration of time
    /// will be required to do so
    Acknowledge,
    /// The device is engaged in processing a long–duration program command, try again later
    SlaveDeviceBusy,
    /// The device cannot perform the program function received in the query
    NegativeAcknowledge,
    /// The device attempted to read a record file, but detected a parity error in the memory
    MemoryParityError,
    /// A gateway was unable to allocate an internal communication path from the input port to
    /// the output port for processing the request
    GatewayPath,
    /// No response was obtained from the target device behind a gateway
    GatewayTargetDevice,
    /// The exception code received is not defined in the standard
    Unknown(u8),
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            exceptions::ILLEGAL_FUNCTION => ExceptionCode::IllegalFunction,
            exceptions::ILLEGAL_DATA_ADDRESS => ExceptionCode::IllegalDataAddress,
            exceptions::ILLEGAL_DATA_VALUE => ExceptionCode::IllegalDataValue,
            exceptions::SLAVE_DEVICE_FAILURE => ExceptionCode::SlaveDeviceFailure,
            exceptions::ACKNOWLEDGE => ExceptionCode::Acknowledge,
            exceptions::SLAVE_DEVICE_BUSY => ExceptionCode::SlaveDeviceBusy,
            exceptions::NEGATIVE_ACKNOWLEDGE => ExceptionCode::NegativeAcknowledge,
            exceptions::MEMORY_PARITY_ERROR => ExceptionCode::MemoryParityError,
            exceptions::GATEWAY_PATH => ExceptionCode::GatewayPath,
            exceptions::GATEWAY_TARGET_DEVICE => ExceptionCode::GatewayTargetDevice,
            _ => ExceptionCode::Unknown(value),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(ex: ExceptionCode) -> Self {
        match ex {
            ExceptionCode::IllegalFunction => exceptions::ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => exceptions::ILLEGAL_DATA_ADDRESS,
            ExceptionCode::IllegalDataValue => exceptions::ILLEGAL_DATA_VALUE,
            ExceptionCode::SlaveDeviceFailure => exceptions::SLAVE_DEVICE_FAILURE,
            ExceptionCode::Acknowledge => exceptions::ACKNOWLEDGE,
            ExceptionCode::SlaveDeviceBusy => exceptions::SLAVE_DEVICE_BUSY,
            ExceptionCode::NegativeAcknowledge => exceptions::NEGATIVE_ACKNOWLEDGE,
            ExceptionCode::MemoryParityError => exceptions::MEMORY_PARITY_ERROR,
            ExceptionCode::GatewayPath => exceptions::GATEWAY_PATH,
            ExceptionCode::GatewayTargetDevice => exceptions::GATEWAY_TARGET_DEVICE,
            ExceptionCode::Unknown(value) => value,
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let description = match self {
            ExceptionCode::IllegalFunction => {
                "function code received in the query is not an allowable action for the device"
            }
            ExceptionCode::IllegalDataAddress => {
                "data address received in the query is not an allowable address for the device"
            }
            ExceptionCode::IllegalDataValue => {
                "value contained in the request is not an allowable value for the device"
            }
            ExceptionCode::SlaveDeviceFailure => {
                "unrecoverable error occurred while the device was performing the requested action"
            }
            ExceptionCode::Acknowledge => "device has accepted the request and is processing it",
            ExceptionCode::SlaveDeviceBusy => {
                "device is busy processing a long duration program command, try again later"
            }
            ExceptionCode::NegativeAcknowledge => {
                "device cannot perform the requested program function"
            }
            ExceptionCode::MemoryParityError => {
                "device detected a parity error in the memory while reading a record file"
            }
            ExceptionCode::GatewayPath => {
                "gateway was unable to allocate an internal communication path for the request"
            }
            ExceptionCode::GatewayTargetDevice => {
                "gateway did not receive a response from the target device"
            }
            ExceptionCode::Unknown(code) => {
                return write!(f, "received unknown exception code: {code:#04X}");
            }
        };

        f.write_str(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_every_code_in_both_directions() {
        for raw in 0..=u8::MAX {
            let code = ExceptionCode::from(raw);
            assert_eq!(u8::from(code), raw);
        }
    }

    #[test]
    fn reserved_codes_are_unknown() {
        assert_eq!(ExceptionCode::from(0x09), ExceptionCode::Unknown(0x09));
        assert_eq!(ExceptionCode::from(0x07), ExceptionCode::NegativeAcknowledge);
        assert_eq!(ExceptionCode::from(0x0B), ExceptionCode::GatewayTargetDevice);
    }
}
