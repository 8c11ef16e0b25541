use crate::common::checksum::crc16;
use crate::common::function::{FunctionCode, ERROR_BIT};
use crate::constants::limits::MAX_PDU_LENGTH;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::protocol::{Adu, Protocol};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const HEADER_LENGTH: usize = 1;
    pub(crate) const FUNCTION_CODE_LENGTH: usize = 1;
    pub(crate) const CRC_LENGTH: usize = 2;
    pub(crate) const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + FUNCTION_CODE_LENGTH + CRC_LENGTH;
    pub(crate) const MAX_FRAME_LENGTH: usize =
        HEADER_LENGTH + crate::constants::limits::MAX_PDU_LENGTH + CRC_LENGTH;
    /// unit id, function code, MEI type, category, conformity, more follows, next id, count
    pub(crate) const DEVICE_ID_HEADER_LENGTH: usize = 8;
}

#[derive(Clone, Copy)]
enum LengthMode {
    /// The length is always the same (without function code)
    Fixed(usize),
    /// You need to read X more bytes. The last byte contains the number of extra bytes to read
    /// after that
    Offset(usize),
    /// The reply is a list of length-prefixed objects that has to be walked
    DeviceIdentification,
    /// Unknown function code, can't determine the size
    Unknown,
}

/// Modbus RTU: unit id, PDU and a little-endian CRC-16
///
/// RTU frames carry no length field, so the size of a response is inferred from its function
/// code.
#[derive(Clone, Copy, Debug, Default)]
pub struct RtuProtocol;

impl RtuProtocol {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }

    // Returns how to calculate the length of the body
    fn length_mode(function_code: u8) -> LengthMode {
        if function_code & ERROR_BIT != 0 {
            return LengthMode::Fixed(1);
        }

        let function_code = match FunctionCode::get(function_code) {
            Some(code) => code,
            None => return LengthMode::Unknown,
        };

        match function_code {
            FunctionCode::ReadCoils => LengthMode::Offset(1),
            FunctionCode::ReadDiscreteInputs => LengthMode::Offset(1),
            FunctionCode::ReadHoldingRegisters => LengthMode::Offset(1),
            FunctionCode::ReadInputRegisters => LengthMode::Offset(1),
            FunctionCode::WriteSingleCoil => LengthMode::Fixed(4),
            FunctionCode::WriteSingleRegister => LengthMode::Fixed(4),
            FunctionCode::WriteMultipleCoils => LengthMode::Fixed(4),
            FunctionCode::WriteMultipleRegisters => LengthMode::Fixed(4),
            FunctionCode::EncapsulatedInterface => LengthMode::DeviceIdentification,
        }
    }

    /// Total length of the response frame, or `None` if not enough has been received to tell
    fn expected_length(response: &[u8]) -> Option<usize> {
        const PREFIX: usize = constants::HEADER_LENGTH + constants::FUNCTION_CODE_LENGTH;

        let function_code = *response.get(1)?;
        let body = match Self::length_mode(function_code) {
            LengthMode::Fixed(length) => length,
            LengthMode::Offset(offset) => {
                let extra = *response.get(PREFIX + offset - 1)? as usize;
                offset + extra
            }
            LengthMode::DeviceIdentification => {
                let count = *response.get(constants::DEVICE_ID_HEADER_LENGTH - 1)?;
                let mut position = constants::DEVICE_ID_HEADER_LENGTH;
                for _ in 0..count {
                    let length = *response.get(position + 1)? as usize;
                    position += 2 + length;
                }
                position - PREFIX
            }
            // nothing to go on, so settle for the smallest possible frame
            LengthMode::Unknown => return Some(constants::MIN_FRAME_LENGTH),
        };

        Some(PREFIX + body + constants::CRC_LENGTH)
    }
}

impl Protocol for RtuProtocol {
    fn name(&self) -> &'static str {
        "RTU"
    }

    fn encode_adu(&self, unit_id: UnitId, pdu: &[u8]) -> Result<Vec<u8>, RequestError> {
        if pdu.len() > MAX_PDU_LENGTH {
            return Err(InternalError::AduTooBig(
                pdu.len() + constants::HEADER_LENGTH + constants::CRC_LENGTH,
            )
            .into());
        }

        let mut frame = Vec::with_capacity(pdu.len() + 3);
        frame.push(unit_id.value);
        frame.extend_from_slice(pdu);
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    fn decode_adu(&self, frame: &[u8]) -> Result<Adu, RequestError> {
        if frame.len() < constants::MIN_FRAME_LENGTH {
            return Err(
                FrameParseError::FrameTooShort(frame.len(), constants::MIN_FRAME_LENGTH).into(),
            );
        }

        if frame.len() > constants::MAX_FRAME_LENGTH {
            return Err(
                FrameParseError::FrameLengthTooBig(frame.len(), constants::MAX_FRAME_LENGTH).into(),
            );
        }

        let (body, crc) = frame.split_at(frame.len() - constants::CRC_LENGTH);
        let received_crc = u16::from_le_bytes([crc[0], crc[1]]);
        let expected_crc = crc16(body);

        if received_crc != expected_crc {
            return Err(FrameParseError::CrcValidationFailure(received_crc, expected_crc).into());
        }

        Ok(Adu {
            unit_id: UnitId::new(body[0]),
            pdu: body[constants::HEADER_LENGTH..].to_vec(),
        })
    }

    fn check_response_complete(&self, response: &[u8]) -> bool {
        match Self::expected_length(response) {
            Some(length) => response.len() >= length,
            None => false,
        }
    }
}
