use scursor::ReadCursor;

use crate::common::bits::{byte_count_for_bits, byte_count_for_registers, pack_bits};
use crate::common::function::{FunctionCode, ERROR_BIT};
use crate::constants::mei;
use crate::device::{DeviceIdCategory, DeviceIdentificationRaw};
use crate::error::{AduParseError, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{coil_from_u16, AddressRange, ModbusObject, ObjectKind};

pub(crate) fn read_request(function: FunctionCode, range: AddressRange) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(function.get_value());
    pdu.extend_from_slice(&range.start.to_be_bytes());
    pdu.extend_from_slice(&range.count.to_be_bytes());
    pdu
}

pub(crate) fn write_single_request(function: FunctionCode, address: u16, value: u16) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(5);
    pdu.push(function.get_value());
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

pub(crate) fn write_multiple_coils_request(
    range: AddressRange,
    values: &[bool],
) -> Result<Vec<u8>, RequestError> {
    let byte_count = byte_count_for_bits(values.len())?;
    let mut pdu = Vec::with_capacity(6 + byte_count as usize);
    pdu.push(FunctionCode::WriteMultipleCoils.get_value());
    pdu.extend_from_slice(&range.start.to_be_bytes());
    pdu.extend_from_slice(&range.count.to_be_bytes());
    pdu.push(byte_count);
    pdu.extend(pack_bits(values.iter().copied()));
    Ok(pdu)
}

pub(crate) fn write_multiple_registers_request(
    range: AddressRange,
    values: &[u16],
) -> Result<Vec<u8>, RequestError> {
    let byte_count = byte_count_for_registers(values.len())?;
    let mut pdu = Vec::with_capacity(6 + byte_count as usize);
    pdu.push(FunctionCode::WriteMultipleRegisters.get_value());
    pdu.extend_from_slice(&range.start.to_be_bytes());
    pdu.extend_from_slice(&range.count.to_be_bytes());
    pdu.push(byte_count);
    for value in values {
        pdu.extend_from_slice(&value.to_be_bytes());
    }
    Ok(pdu)
}

pub(crate) fn device_id_request(category: DeviceIdCategory, object_id: u8) -> Vec<u8> {
    vec![
        FunctionCode::EncapsulatedInterface.get_value(),
        mei::READ_DEVICE_ID,
        category as u8,
        object_id,
    ]
}

/// Consume the function code, turning an exception response into an error
pub(crate) fn expect_function(
    cursor: &mut ReadCursor,
    function: FunctionCode,
) -> Result<(), RequestError> {
    let received = cursor.read_u8()?;

    if received & ERROR_BIT != 0 {
        if received != function.as_error() {
            return Err(AduParseError::UnexpectedFunction(received, function.as_error()).into());
        }
        let code = ExceptionCode::from(cursor.read_u8()?);
        return Err(RequestError::Exception(code));
    }

    if received != function.get_value() {
        return Err(AduParseError::UnexpectedFunction(received, function.get_value()).into());
    }

    Ok(())
}

fn expect_empty(cursor: &ReadCursor) -> Result<(), RequestError> {
    match cursor.remaining() {
        0 => Ok(()),
        count => Err(AduParseError::TrailingBytes(count).into()),
    }
}

fn read_byte_counted<'a>(cursor: &mut ReadCursor<'a>) -> Result<&'a [u8], RequestError> {
    let count = cursor.read_u8()? as usize;
    let remaining = cursor.remaining();
    if remaining < count {
        return Err(AduParseError::InsufficientBytesForByteCount(count, remaining).into());
    }
    let bytes = cursor.read_bytes(count)?;
    expect_empty(cursor)?;
    Ok(bytes)
}

/// Parse a read coils / discrete inputs response.
///
/// Addresses are relative to the start of the request and every bit of every byte is returned.
pub(crate) fn parse_read_bits(
    pdu: &[u8],
    function: FunctionCode,
    kind: ObjectKind,
) -> Result<Vec<ModbusObject>, RequestError> {
    let mut cursor = ReadCursor::new(pdu);
    expect_function(&mut cursor, function)?;
    let bytes = read_byte_counted(&mut cursor)?;

    Ok(bytes
        .iter()
        .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
        .enumerate()
        .map(|(index, value)| ModbusObject::from_bool(kind, index as u16, value))
        .collect())
}

/// Parse a read holding / input registers response. Addresses are relative to the request.
pub(crate) fn parse_read_registers(
    pdu: &[u8],
    function: FunctionCode,
    kind: ObjectKind,
) -> Result<Vec<ModbusObject>, RequestError> {
    let mut cursor = ReadCursor::new(pdu);
    expect_function(&mut cursor, function)?;
    let bytes = read_byte_counted(&mut cursor)?;

    if bytes.len() % 2 != 0 {
        return Err(AduParseError::TrailingBytes(1).into());
    }

    Ok(bytes
        .chunks_exact(2)
        .enumerate()
        .map(|(index, pair)| ModbusObject::new(kind, index as u16, pair[0], pair[1]))
        .collect())
}

/// Parse the echo of a write single coil
pub(crate) fn parse_write_single_coil(pdu: &[u8]) -> Result<ModbusObject, RequestError> {
    let (address, value) = parse_write_single(pdu, FunctionCode::WriteSingleCoil)?;
    Ok(ModbusObject::coil(address, coil_from_u16(value)?))
}

/// Parse the echo of a write single register
pub(crate) fn parse_write_single_register(pdu: &[u8]) -> Result<ModbusObject, RequestError> {
    let (address, value) = parse_write_single(pdu, FunctionCode::WriteSingleRegister)?;
    Ok(ModbusObject::holding_register(address, value))
}

fn parse_write_single(pdu: &[u8], function: FunctionCode) -> Result<(u16, u16), RequestError> {
    let mut cursor = ReadCursor::new(pdu);
    expect_function(&mut cursor, function)?;
    let address = cursor.read_u16_be()?;
    let value = cursor.read_u16_be()?;
    expect_empty(&cursor)?;
    Ok((address, value))
}

/// Parse the (start, count) echo of a write multiple coils / registers
pub(crate) fn parse_write_multiple(
    pdu: &[u8],
    function: FunctionCode,
) -> Result<AddressRange, RequestError> {
    let mut cursor = ReadCursor::new(pdu);
    expect_function(&mut cursor, function)?;
    let start = cursor.read_u16_be()?;
    let count = cursor.read_u16_be()?;
    expect_empty(&cursor)?;
    Ok(AddressRange { start, count })
}

/// Parse one page of a read device identification response
pub(crate) fn parse_device_id(pdu: &[u8]) -> Result<DeviceIdentificationRaw, RequestError> {
    let mut cursor = ReadCursor::new(pdu);
    expect_function(&mut cursor, FunctionCode::EncapsulatedInterface)?;

    let mei_type = cursor.read_u8()?;
    if mei_type != mei::READ_DEVICE_ID {
        return Err(AduParseError::UnknownMeiType(mei_type).into());
    }

    let category = cursor.read_u8()?;
    let conformity_level = cursor.read_u8()?;
    let more_follows = cursor.read_u8()?;
    let next_object_id = cursor.read_u8()?;
    let object_count = cursor.read_u8()?;

    let mut page = DeviceIdentificationRaw {
        category,
        conformity_level,
        individual_access_allowed: conformity_level & mei::INDIVIDUAL_ACCESS_BIT != 0,
        more_requests_needed: more_follows == mei::MORE_FOLLOWS,
        next_object_id,
        objects: Default::default(),
    };

    // anything after the announced number of objects is ignored
    for _ in 0..object_count {
        let id = cursor.read_u8()?;
        let length = cursor.read_u8()? as usize;
        let remaining = cursor.remaining();
        if remaining < length {
            return Err(AduParseError::InsufficientBytesForByteCount(length, remaining).into());
        }
        page.objects.insert(id, cursor.read_bytes(length)?.to_vec());
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_read_request() {
        let range = AddressRange::try_from(0x0010, 0x0013).unwrap();
        assert_eq!(
            read_request(FunctionCode::ReadCoils, range),
            vec![0x01, 0x00, 0x10, 0x00, 0x13]
        );
    }

    #[test]
    fn serializes_write_multiple_coils() {
        let range = AddressRange::try_from(0x0013, 10).unwrap();
        let values = [true, false, true, true, false, false, true, true, true, false];
        assert_eq!(
            write_multiple_coils_request(range, &values).unwrap(),
            vec![0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn serializes_write_multiple_registers() {
        let range = AddressRange::try_from(0x0001, 2).unwrap();
        assert_eq!(
            write_multiple_registers_request(range, &[0x000A, 0x0102]).unwrap(),
            vec![0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn parses_bits_relative_to_zero() {
        let objects =
            parse_read_bits(&[0x01, 0x01, 0x05], FunctionCode::ReadCoils, ObjectKind::Coil)
                .unwrap();
        assert_eq!(objects.len(), 8);
        assert_eq!(objects[0], ModbusObject::coil(0, true));
        assert_eq!(objects[1], ModbusObject::coil(1, false));
        assert_eq!(objects[2], ModbusObject::coil(2, true));
    }

    #[test]
    fn parses_registers_relative_to_zero() {
        let objects = parse_read_registers(
            &[0x04, 0x04, 0x12, 0x34, 0xCA, 0xFE],
            FunctionCode::ReadInputRegisters,
            ObjectKind::InputRegister,
        )
        .unwrap();
        assert_eq!(
            objects,
            vec![
                ModbusObject::input_register(0, 0x1234),
                ModbusObject::input_register(1, 0xCAFE)
            ]
        );
    }

    #[test]
    fn exception_responses_become_errors() {
        assert_eq!(
            parse_read_registers(
                &[0x83, 0x02],
                FunctionCode::ReadHoldingRegisters,
                ObjectKind::HoldingRegister
            ),
            Err(RequestError::Exception(ExceptionCode::IllegalDataAddress))
        );
    }

    #[test]
    fn rejects_wrong_function_code() {
        assert_eq!(
            parse_read_bits(&[0x02, 0x01, 0x00], FunctionCode::ReadCoils, ObjectKind::Coil),
            Err(RequestError::BadResponse(AduParseError::UnexpectedFunction(
                0x02, 0x01
            )))
        );
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        assert_eq!(
            parse_read_bits(&[0x01, 0x02, 0x00], FunctionCode::ReadCoils, ObjectKind::Coil),
            Err(RequestError::BadResponse(
                AduParseError::InsufficientBytesForByteCount(2, 1)
            ))
        );
        assert_eq!(
            parse_read_bits(
                &[0x01, 0x01, 0x00, 0x00],
                FunctionCode::ReadCoils,
                ObjectKind::Coil
            ),
            Err(RequestError::BadResponse(AduParseError::TrailingBytes(1)))
        );
    }

    #[test]
    fn rejects_unknown_coil_state() {
        assert_eq!(
            parse_write_single_coil(&[0x05, 0x00, 0x01, 0x12, 0x34]),
            Err(RequestError::BadResponse(AduParseError::UnknownCoilState(
                0x1234
            )))
        );
    }

    #[test]
    fn parses_device_identification_page() {
        let pdu = [
            0x2B, 0x0E, 0x01, 0x81, 0xFF, 0x02, 0x02, // header
            0x00, 0x03, b'a', b'b', b'c', // vendor name
            0x01, 0x02, b'x', b'y', // product code
            0x02, 0x01, b'z', // beyond the announced count, ignored
        ];
        let page = parse_device_id(&pdu).unwrap();
        assert!(page.individual_access_allowed);
        assert!(page.more_requests_needed);
        assert_eq!(page.next_object_id, 0x02);
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects.get(&0x00), Some(&b"abc".to_vec()));
        assert_eq!(page.objects.get(&0x01), Some(&b"xy".to_vec()));
    }

    #[test]
    fn rejects_truncated_device_identification_object() {
        let pdu = [0x2B, 0x0E, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x05, b'a'];
        assert_eq!(
            parse_device_id(&pdu),
            Err(RequestError::BadResponse(
                AduParseError::InsufficientBytesForByteCount(5, 1)
            ))
        );
    }

    #[test]
    fn rejects_other_mei_types() {
        let pdu = [0x2B, 0x0D, 0x01, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(
            parse_device_id(&pdu),
            Err(RequestError::BadResponse(AduParseError::UnknownMeiType(0x0D)))
        );
    }
}
