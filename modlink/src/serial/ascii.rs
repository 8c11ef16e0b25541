use crate::common::checksum::lrc8;
use crate::constants::limits::MAX_PDU_LENGTH;
use crate::error::{AduParseError, FrameParseError, InternalError, RequestError};
use crate::protocol::{Adu, Protocol};
use crate::types::UnitId;

pub(crate) mod constants {
    pub(crate) const START: u8 = b':';
    pub(crate) const TERMINATOR: &[u8] = b"\r\n";
    /// unit id, function code and LRC
    pub(crate) const MIN_DECODED_LENGTH: usize = 3;
    pub(crate) const MAX_DECODED_LENGTH: usize = 1 + crate::constants::limits::MAX_PDU_LENGTH + 1;
}

/// Modbus ASCII: ':' followed by the hex encoded unit id, PDU and LRC, terminated by CR LF
#[derive(Clone, Copy, Debug, Default)]
pub struct AsciiProtocol;

impl AsciiProtocol {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn push_hex(output: &mut Vec<u8>, byte: u8) {
    output.push(HEX_DIGITS[(byte >> 4) as usize]);
    output.push(HEX_DIGITS[(byte & 0x0F) as usize]);
}

fn hex_value(c: u8) -> Result<u8, FrameParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(FrameParseError::InvalidHexCharacter(c)),
    }
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>, FrameParseError> {
    if hex.len() % 2 != 0 {
        return Err(FrameParseError::OddHexLength(hex.len()));
    }

    hex.chunks_exact(2)
        .map(|pair| -> Result<u8, FrameParseError> {
            Ok((hex_value(pair[0])? << 4) | hex_value(pair[1])?)
        })
        .collect()
}

fn find_terminator(frame: &[u8]) -> Option<usize> {
    frame
        .windows(constants::TERMINATOR.len())
        .position(|window| window == constants::TERMINATOR)
}

impl Protocol for AsciiProtocol {
    fn name(&self) -> &'static str {
        "ASCII"
    }

    fn encode_adu(&self, unit_id: UnitId, pdu: &[u8]) -> Result<Vec<u8>, RequestError> {
        if pdu.len() > MAX_PDU_LENGTH {
            return Err(InternalError::AduTooBig(1 + 2 * (pdu.len() + 2) + 2).into());
        }

        let mut body = Vec::with_capacity(pdu.len() + 1);
        body.push(unit_id.value);
        body.extend_from_slice(pdu);

        let mut frame = Vec::with_capacity(1 + 2 * (body.len() + 1) + 2);
        frame.push(constants::START);
        for byte in &body {
            push_hex(&mut frame, *byte);
        }
        push_hex(&mut frame, lrc8(&body));
        frame.extend_from_slice(constants::TERMINATOR);
        Ok(frame)
    }

    fn decode_adu(&self, frame: &[u8]) -> Result<Adu, RequestError> {
        match frame.first() {
            Some(&constants::START) => {}
            Some(_) => return Err(FrameParseError::MissingStartCharacter.into()),
            None => return Err(FrameParseError::FrameTooShort(0, 1).into()),
        }

        let end = find_terminator(frame).ok_or(FrameParseError::MissingTerminator)?;

        let trailing = frame.len() - (end + constants::TERMINATOR.len());
        if trailing > 0 {
            return Err(AduParseError::TrailingBytes(trailing).into());
        }

        let hex = &frame[1..end];
        if hex.len() > 2 * constants::MAX_DECODED_LENGTH {
            return Err(FrameParseError::FrameLengthTooBig(
                hex.len() / 2,
                constants::MAX_DECODED_LENGTH,
            )
            .into());
        }

        let decoded = decode_hex(hex)?;
        if decoded.len() < constants::MIN_DECODED_LENGTH {
            return Err(FrameParseError::FrameTooShort(
                decoded.len(),
                constants::MIN_DECODED_LENGTH,
            )
            .into());
        }

        let (body, lrc) = decoded.split_at(decoded.len() - 1);
        let expected = lrc8(body);
        if lrc[0] != expected {
            return Err(FrameParseError::LrcValidationFailure(lrc[0], expected).into());
        }

        Ok(Adu {
            unit_id: UnitId::new(body[0]),
            pdu: body[1..].to_vec(),
        })
    }

    fn check_response_complete(&self, response: &[u8]) -> bool {
        find_terminator(response).is_some()
    }
}
