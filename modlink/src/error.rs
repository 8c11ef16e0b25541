use crate::exception::ExceptionCode;
use crate::types::ObjectKind;

/// Top-level error type for every operation performed through a connection or client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// An I/O error occurred on the physical link
    Io(std::io::ErrorKind),
    /// The device replied with a Modbus exception
    Exception(ExceptionCode),
    /// Request parameters were invalid and nothing was sent
    BadRequest(InvalidRequest),
    /// The received frame was malformed or failed its checksum
    BadFrame(FrameParseError),
    /// The frame was valid, but the response it carried was not
    BadResponse(AduParseError),
    /// An internal error occurred in the library itself
    Internal(InternalError),
    /// A read or write on the physical link did not complete in time
    ResponseTimeout,
    /// The connection could not be (re-)established before the connect timeout elapsed
    ConnectTimeout,
    /// No connection could be established to the device
    NoConnection,
    /// The caller cancelled the request
    Cancelled,
    /// The connection or client was disposed
    Shutdown,
}

impl RequestError {
    /// Returns true if the error was raised by the physical link. These errors close the link
    /// and cause the connection to reconnect before the next request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RequestError::Io(_) | RequestError::ResponseTimeout | RequestError::ConnectTimeout
        )
    }

    /// Returns true if the error indicates the request was cancelled, either by the caller or by
    /// disposal of the connection
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RequestError::Cancelled | RequestError::Shutdown)
    }
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => std::io::Error::from(*kind).fmt(f),
            RequestError::Exception(err) => write!(f, "device exception: {err}"),
            RequestError::BadRequest(err) => write!(f, "invalid request: {err}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::BadResponse(err) => write!(f, "bad response: {err}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::ResponseTimeout => f.write_str("link operation timed out"),
            RequestError::ConnectTimeout => {
                f.write_str("connection was not established before the connect timeout")
            }
            RequestError::NoConnection => f.write_str("no connection exists to the device"),
            RequestError::Cancelled => f.write_str("request was cancelled by the caller"),
            RequestError::Shutdown => f.write_str("connection or client has been disposed"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(err: ExceptionCode) -> Self {
        RequestError::Exception(err)
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(_: scursor::ReadError) -> Self {
        RequestError::BadResponse(AduParseError::InsufficientBytes)
    }
}

/// Errors that result from bad request parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvalidRequest {
    /// Request contains a count of zero
    CountOfZero,
    /// Start and count would overflow the u16 address space
    AddressOverflow(u16, u16),
    /// The requested count exceeds the maximum allowed for the function
    CountTooLargeForType(u16, u16),
    /// The same address appears more than once in a write batch
    DuplicateAddress(u16),
    /// The addresses in a write batch have a gap (expected, actual)
    NonContiguousAddresses(u16, u16),
    /// A value of the wrong object kind was supplied (expected, actual)
    WrongObjectKind(ObjectKind, ObjectKind),
}

impl std::error::Error for InvalidRequest {}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRequest::CountOfZero => f.write_str("request contains a count of zero"),
            InvalidRequest::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the representation of u16"
            ),
            InvalidRequest::CountTooLargeForType(count, max) => write!(
                f,
                "the request count of {count} exceeds maximum allowed count of {max} for this type"
            ),
            InvalidRequest::DuplicateAddress(address) => {
                write!(f, "address {address} appears more than once in the request")
            }
            InvalidRequest::NonContiguousAddresses(expected, actual) => write!(
                f,
                "addresses are not contiguous, expected {expected} but found {actual}"
            ),
            InvalidRequest::WrongObjectKind(expected, actual) => {
                write!(f, "expected a value of kind {expected} but got {actual}")
            }
        }
    }
}

/// Errors that occur while parsing a frame (TCP, RTU or ASCII)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Frame is shorter than the minimum for the wire format (actual, minimum)
    FrameTooShort(usize, usize),
    /// Frame exceeds the maximum allowed size (actual, maximum)
    FrameLengthTooBig(usize, usize),
    /// Received TCP frame with the length field set to zero
    MbapLengthZero,
    /// Received TCP frame with length that exceeds max allowed size (actual, maximum)
    MbapLengthTooBig(usize, usize),
    /// MBAP length field does not match the number of bytes received (declared, actual)
    MbapLengthMismatch(usize, usize),
    /// Received TCP frame within non-Modbus protocol id
    UnknownProtocolId(u16),
    /// Transaction id of the response does not match the request (expected, actual)
    TransactionIdMismatch(u16, u16),
    /// RTU CRC validation failed (received, expected)
    CrcValidationFailure(u16, u16),
    /// ASCII LRC validation failed (received, expected)
    LrcValidationFailure(u8, u8),
    /// ASCII frame does not begin with ':'
    MissingStartCharacter,
    /// ASCII frame does not end with CR LF
    MissingTerminator,
    /// ASCII frame contains a character that is not a hex digit
    InvalidHexCharacter(u8),
    /// ASCII frame contains an odd number of hex digits
    OddHexLength(usize),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::FrameTooShort(size, min) => {
                write!(f, "frame length ({size}) is less than the minimum ({min})")
            }
            FrameParseError::FrameLengthTooBig(size, max) => {
                write!(f, "frame length ({size}) exceeds the maximum allowed ({max})")
            }
            FrameParseError::MbapLengthZero => {
                f.write_str("received TCP frame with the length field set to zero")
            }
            FrameParseError::MbapLengthTooBig(size, max) => write!(
                f,
                "received TCP frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::MbapLengthMismatch(declared, actual) => write!(
                f,
                "MBAP length field ({declared}) does not match the received length ({actual})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received TCP frame with non-Modbus protocol id: {id}")
            }
            FrameParseError::TransactionIdMismatch(expected, actual) => write!(
                f,
                "received transaction id {actual:#06X} while expecting {expected:#06X}"
            ),
            FrameParseError::CrcValidationFailure(received, expected) => write!(
                f,
                "received CRC {received:#06X} does not match the calculated CRC {expected:#06X}"
            ),
            FrameParseError::LrcValidationFailure(received, expected) => write!(
                f,
                "received LRC {received:#04X} does not match the calculated LRC {expected:#04X}"
            ),
            FrameParseError::MissingStartCharacter => {
                f.write_str("ASCII frame does not begin with ':'")
            }
            FrameParseError::MissingTerminator => {
                f.write_str("ASCII frame does not end with CR LF")
            }
            FrameParseError::InvalidHexCharacter(c) => {
                write!(f, "ASCII frame contains non-hex character {c:#04X}")
            }
            FrameParseError::OddHexLength(len) => {
                write!(f, "ASCII frame contains an odd number of hex digits ({len})")
            }
        }
    }
}

/// Errors that occur while parsing the PDU of a response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// Response is too short to be valid
    InsufficientBytes,
    /// Byte count doesn't match the actual number of bytes present (count, remaining)
    InsufficientBytesForByteCount(usize, usize),
    /// The response holds fewer values than requested (requested, actual)
    RequestByteCountMismatch(usize, usize),
    /// Response contains extra trailing bytes
    TrailingBytes(usize),
    /// A parameter expected to be echoed in the reply did not match
    ReplyEchoMismatch,
    /// The unit id of the response does not match the request (expected, actual)
    UnitIdMismatch(u8, u8),
    /// An unexpected response function code was received (actual, expected)
    UnexpectedFunction(u8, u8),
    /// Bad value for the coil state
    UnknownCoilState(u16),
    /// The MEI type of a device identification reply was not 0x0E
    UnknownMeiType(u8),
    /// A device identification reply asked to continue without advancing the object id
    DeviceIdNotAdvancing(u8),
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("response is too short to be valid"),
            AduParseError::InsufficientBytesForByteCount(count, remaining) => write!(
                f,
                "byte count ({count}) doesn't match the number of bytes remaining ({remaining})"
            ),
            AduParseError::RequestByteCountMismatch(requested, actual) => write!(
                f,
                "response contains {actual} values while {requested} were requested"
            ),
            AduParseError::TrailingBytes(remaining) => {
                write!(f, "response contains {remaining} extra trailing bytes")
            }
            AduParseError::ReplyEchoMismatch => {
                f.write_str("a parameter expected to be echoed in the reply did not match")
            }
            AduParseError::UnitIdMismatch(expected, actual) => write!(
                f,
                "response unit id ({actual:#04X}) does not match the request ({expected:#04X})"
            ),
            AduParseError::UnexpectedFunction(actual, expected) => write!(
                f,
                "received response function code {actual:#04X} while expecting {expected:#04X}"
            ),
            AduParseError::UnknownCoilState(value) => {
                write!(f, "received coil state with unspecified value: {value:#06X}")
            }
            AduParseError::UnknownMeiType(value) => {
                write!(f, "received unexpected MEI type: {value:#04X}")
            }
            AduParseError::DeviceIdNotAdvancing(id) => write!(
                f,
                "device identification continues at object {id:#04X} which does not advance"
            ),
        }
    }
}

/// Errors that indicate faulty logic in the library itself or a misconfigured client
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// The client was constructed without a protocol
    NoProtocol,
    /// The PDU does not fit into an ADU of the wire format
    AduTooBig(usize),
    /// A byte count would not fit in the u8 byte count field
    BadByteCount(usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::NoProtocol => f.write_str("no protocol is configured for the client"),
            InternalError::AduTooBig(size) => {
                write!(f, "ADU length of {size} exceeds the maximum allowed length")
            }
            InternalError::BadByteCount(size) => {
                write!(f, "byte count would exceed maximum size of u8: {size}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_classified() {
        assert!(RequestError::Io(std::io::ErrorKind::ConnectionReset).is_transport());
        assert!(RequestError::ResponseTimeout.is_transport());
        assert!(!RequestError::Exception(ExceptionCode::IllegalFunction).is_transport());
        assert!(!RequestError::BadFrame(FrameParseError::MissingTerminator).is_transport());
        assert!(!RequestError::Cancelled.is_transport());
    }

    #[test]
    fn cancellation_errors_are_classified() {
        assert!(RequestError::Cancelled.is_cancellation());
        assert!(RequestError::Shutdown.is_cancellation());
        assert!(!RequestError::NoConnection.is_cancellation());
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err: RequestError = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err, RequestError::Io(std::io::ErrorKind::UnexpectedEof));
    }
}
