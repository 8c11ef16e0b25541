use std::sync::atomic::{AtomicU16, Ordering};

use scursor::ReadCursor;

use crate::constants::limits::MAX_PDU_LENGTH;
use crate::error::{FrameParseError, InternalError, RequestError};
use crate::protocol::{Adu, Protocol};
use crate::types::UnitId;

pub(crate) mod constants {
    /// transaction id, protocol id and length
    pub(crate) const PREFIX_LENGTH: usize = 6;
    /// prefix plus the unit id
    pub(crate) const HEADER_LENGTH: usize = PREFIX_LENGTH + 1;
    /// unit id plus the largest PDU
    pub(crate) const MAX_LENGTH_FIELD: usize = crate::constants::limits::MAX_PDU_LENGTH + 1;
}

/// Modbus TCP: MBAP header followed by the PDU
///
/// Every encoded frame gets the next transaction id. Responses must echo the transaction id of
/// the request they answer.
#[derive(Debug, Default)]
pub struct TcpProtocol {
    next_tx_id: AtomicU16,
}

impl TcpProtocol {
    /// Create a codec whose transaction ids start at zero
    pub fn new() -> Self {
        Self::default()
    }

    fn tx_id(frame: &[u8]) -> Result<u16, RequestError> {
        match frame {
            [high, low, ..] => Ok(u16::from_be_bytes([*high, *low])),
            _ => Err(FrameParseError::FrameTooShort(frame.len(), constants::HEADER_LENGTH).into()),
        }
    }
}

impl Protocol for TcpProtocol {
    fn name(&self) -> &'static str {
        "TCP"
    }

    fn encode_adu(&self, unit_id: UnitId, pdu: &[u8]) -> Result<Vec<u8>, RequestError> {
        if pdu.len() > MAX_PDU_LENGTH {
            return Err(InternalError::AduTooBig(pdu.len() + constants::HEADER_LENGTH).into());
        }

        let tx_id = self.next_tx_id.fetch_add(1, Ordering::Relaxed);
        // checked above, the length always fits
        let length = (pdu.len() + 1) as u16;

        let mut frame = Vec::with_capacity(constants::HEADER_LENGTH + pdu.len());
        frame.extend_from_slice(&tx_id.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&length.to_be_bytes());
        frame.push(unit_id.value);
        frame.extend_from_slice(pdu);
        Ok(frame)
    }

    fn decode_adu(&self, frame: &[u8]) -> Result<Adu, RequestError> {
        if frame.len() < constants::HEADER_LENGTH {
            return Err(
                FrameParseError::FrameTooShort(frame.len(), constants::HEADER_LENGTH).into(),
            );
        }

        let mut cursor = ReadCursor::new(frame);
        let _tx_id = cursor.read_u16_be()?;
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;

        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }

        if length == 0 {
            return Err(FrameParseError::MbapLengthZero.into());
        }

        if length > constants::MAX_LENGTH_FIELD {
            return Err(
                FrameParseError::MbapLengthTooBig(length, constants::MAX_LENGTH_FIELD).into(),
            );
        }

        let received = cursor.remaining();
        if received != length {
            return Err(FrameParseError::MbapLengthMismatch(length, received).into());
        }

        let unit_id = UnitId::new(cursor.read_u8()?);
        let pdu = cursor.read_bytes(cursor.remaining())?.to_vec();

        Ok(Adu { unit_id, pdu })
    }

    fn check_response_complete(&self, response: &[u8]) -> bool {
        match response {
            [_, _, _, _, high, low, ..] => {
                let length = u16::from_be_bytes([*high, *low]) as usize;
                response.len() >= constants::PREFIX_LENGTH + length
            }
            _ => false,
        }
    }

    fn validate_framing(&self, request: &[u8], response: &[u8]) -> Result<(), RequestError> {
        let expected = Self::tx_id(request)?;
        let actual = Self::tx_id(response)?;
        if expected != actual {
            return Err(FrameParseError::TransactionIdMismatch(expected, actual).into());
        }
        Ok(())
    }
}
