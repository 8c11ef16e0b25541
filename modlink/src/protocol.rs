use crate::common::function::{FunctionCode, ERROR_BIT};
use crate::common::pdu;
use crate::constants::limits;
use crate::device::{DeviceIdCategory, DeviceIdentificationRaw};
use crate::error::{AduParseError, InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{AddressRange, ModbusObject, ObjectKind, UnitId};

/// A frame with its transport specific envelope removed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adu {
    /// unit id carried by the frame
    pub unit_id: UnitId,
    /// function code followed by the payload
    pub pdu: Vec<u8>,
}

/// A Modbus wire format (TCP, RTU or ASCII)
///
/// Implementations only deal with framing: wrapping a PDU into an ADU, unwrapping it again and
/// telling when a received response is complete. Building and parsing the individual requests
/// and responses is shared by every wire format and provided on top of those primitives.
///
/// All `serialize_*` methods return the complete frame to send, all `deserialize_*` methods
/// take the complete frame received. Values returned by the read deserializers carry addresses
/// relative to the start of the request (`0..n`).
pub trait Protocol: Send + Sync {
    /// Human readable name of the wire format
    fn name(&self) -> &'static str;

    /// Wrap a PDU into a frame for this wire format
    fn encode_adu(&self, unit_id: UnitId, pdu: &[u8]) -> Result<Vec<u8>, RequestError>;

    /// Check the envelope of a received frame and return its contents
    fn decode_adu(&self, frame: &[u8]) -> Result<Adu, RequestError>;

    /// Returns true once `response` holds a complete frame. Once true for some prefix, appending
    /// more bytes never turns the answer back to false.
    fn check_response_complete(&self, response: &[u8]) -> bool;

    /// Validate parts of the envelope that relate a response to its request
    fn validate_framing(&self, _request: &[u8], _response: &[u8]) -> Result<(), RequestError> {
        Ok(())
    }

    /// Check that `response` answers `request`: same unit id and same function code, ignoring
    /// the error bit. Exception responses are turned into [`RequestError::Exception`].
    fn validate_response(&self, request: &[u8], response: &[u8]) -> Result<(), RequestError> {
        let request_adu = self.decode_adu(request)?;
        let response_adu = self.decode_adu(response)?;

        if request_adu.unit_id != response_adu.unit_id {
            return Err(AduParseError::UnitIdMismatch(
                request_adu.unit_id.value,
                response_adu.unit_id.value,
            )
            .into());
        }

        let expected = first_byte(&request_adu.pdu)?;
        let actual = first_byte(&response_adu.pdu)?;

        if actual & !ERROR_BIT != expected {
            return Err(AduParseError::UnexpectedFunction(actual, expected).into());
        }

        if actual & ERROR_BIT != 0 {
            let code = response_adu
                .pdu
                .get(1)
                .copied()
                .ok_or(AduParseError::InsufficientBytes)?;
            return Err(RequestError::Exception(ExceptionCode::from(code)));
        }

        self.validate_framing(request, response)
    }

    /// Build a read coils request
    fn serialize_read_coils(
        &self,
        unit_id: UnitId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>, RequestError> {
        let range =
            AddressRange::try_from(start, count)?.limited_count(limits::MAX_READ_COILS_COUNT)?;
        self.encode_adu(unit_id, &pdu::read_request(FunctionCode::ReadCoils, range))
    }

    /// Parse a read coils response
    fn deserialize_read_coils(&self, response: &[u8]) -> Result<Vec<ModbusObject>, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_read_bits(&adu.pdu, FunctionCode::ReadCoils, ObjectKind::Coil)
    }

    /// Build a read discrete inputs request
    fn serialize_read_discrete_inputs(
        &self,
        unit_id: UnitId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>, RequestError> {
        let range =
            AddressRange::try_from(start, count)?.limited_count(limits::MAX_READ_COILS_COUNT)?;
        self.encode_adu(
            unit_id,
            &pdu::read_request(FunctionCode::ReadDiscreteInputs, range),
        )
    }

    /// Parse a read discrete inputs response
    fn deserialize_read_discrete_inputs(
        &self,
        response: &[u8],
    ) -> Result<Vec<ModbusObject>, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_read_bits(
            &adu.pdu,
            FunctionCode::ReadDiscreteInputs,
            ObjectKind::DiscreteInput,
        )
    }

    /// Build a read holding registers request
    fn serialize_read_holding_registers(
        &self,
        unit_id: UnitId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>, RequestError> {
        let range =
            AddressRange::try_from(start, count)?.limited_count(limits::MAX_READ_REGISTERS_COUNT)?;
        self.encode_adu(
            unit_id,
            &pdu::read_request(FunctionCode::ReadHoldingRegisters, range),
        )
    }

    /// Parse a read holding registers response
    fn deserialize_read_holding_registers(
        &self,
        response: &[u8],
    ) -> Result<Vec<ModbusObject>, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_read_registers(
            &adu.pdu,
            FunctionCode::ReadHoldingRegisters,
            ObjectKind::HoldingRegister,
        )
    }

    /// Build a read input registers request
    fn serialize_read_input_registers(
        &self,
        unit_id: UnitId,
        start: u16,
        count: u16,
    ) -> Result<Vec<u8>, RequestError> {
        let range =
            AddressRange::try_from(start, count)?.limited_count(limits::MAX_READ_REGISTERS_COUNT)?;
        self.encode_adu(
            unit_id,
            &pdu::read_request(FunctionCode::ReadInputRegisters, range),
        )
    }

    /// Parse a read input registers response
    fn deserialize_read_input_registers(
        &self,
        response: &[u8],
    ) -> Result<Vec<ModbusObject>, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_read_registers(
            &adu.pdu,
            FunctionCode::ReadInputRegisters,
            ObjectKind::InputRegister,
        )
    }

    /// Build a write single coil request
    fn serialize_write_single_coil(
        &self,
        unit_id: UnitId,
        coil: &ModbusObject,
    ) -> Result<Vec<u8>, RequestError> {
        expect_kind(coil, ObjectKind::Coil)?;
        self.encode_adu(
            unit_id,
            &pdu::write_single_request(
                FunctionCode::WriteSingleCoil,
                coil.address,
                coil.coil_value(),
            ),
        )
    }

    /// Parse the echo of a write single coil
    fn deserialize_write_single_coil(&self, response: &[u8]) -> Result<ModbusObject, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_write_single_coil(&adu.pdu)
    }

    /// Build a write single register request
    fn serialize_write_single_register(
        &self,
        unit_id: UnitId,
        register: &ModbusObject,
    ) -> Result<Vec<u8>, RequestError> {
        expect_kind(register, ObjectKind::HoldingRegister)?;
        self.encode_adu(
            unit_id,
            &pdu::write_single_request(
                FunctionCode::WriteSingleRegister,
                register.address,
                register.as_u16(),
            ),
        )
    }

    /// Parse the echo of a write single register
    fn deserialize_write_single_register(
        &self,
        response: &[u8],
    ) -> Result<ModbusObject, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_write_single_register(&adu.pdu)
    }

    /// Build a write multiple coils request. The coils may be given in any order but must form
    /// one contiguous block of addresses.
    fn serialize_write_multiple_coils(
        &self,
        unit_id: UnitId,
        coils: &[ModbusObject],
    ) -> Result<Vec<u8>, RequestError> {
        let (range, sorted) =
            contiguous_batch(coils, ObjectKind::Coil, limits::MAX_WRITE_COILS_COUNT)?;
        let values: Vec<bool> = sorted.iter().map(|x| x.as_bool()).collect();
        self.encode_adu(unit_id, &pdu::write_multiple_coils_request(range, &values)?)
    }

    /// Parse the (start, count) echo of a write multiple coils
    fn deserialize_write_multiple_coils(
        &self,
        response: &[u8],
    ) -> Result<AddressRange, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_write_multiple(&adu.pdu, FunctionCode::WriteMultipleCoils)
    }

    /// Build a write multiple registers request. The registers may be given in any order but
    /// must form one contiguous block of addresses.
    fn serialize_write_multiple_registers(
        &self,
        unit_id: UnitId,
        registers: &[ModbusObject],
    ) -> Result<Vec<u8>, RequestError> {
        let (range, sorted) = contiguous_batch(
            registers,
            ObjectKind::HoldingRegister,
            limits::MAX_WRITE_REGISTERS_COUNT,
        )?;
        let values: Vec<u16> = sorted.iter().map(|x| x.as_u16()).collect();
        self.encode_adu(
            unit_id,
            &pdu::write_multiple_registers_request(range, &values)?,
        )
    }

    /// Parse the (start, count) echo of a write multiple registers
    fn deserialize_write_multiple_registers(
        &self,
        response: &[u8],
    ) -> Result<AddressRange, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_write_multiple(&adu.pdu, FunctionCode::WriteMultipleRegisters)
    }

    /// Build a read device identification request
    fn serialize_read_device_identification(
        &self,
        unit_id: UnitId,
        category: DeviceIdCategory,
        object_id: u8,
    ) -> Result<Vec<u8>, RequestError> {
        self.encode_adu(unit_id, &pdu::device_id_request(category, object_id))
    }

    /// Parse one page of a read device identification response
    fn deserialize_read_device_identification(
        &self,
        response: &[u8],
    ) -> Result<DeviceIdentificationRaw, RequestError> {
        let adu = self.decode_adu(response)?;
        pdu::parse_device_id(&adu.pdu)
    }
}

fn first_byte(pdu: &[u8]) -> Result<u8, RequestError> {
    pdu.first()
        .copied()
        .ok_or_else(|| AduParseError::InsufficientBytes.into())
}

fn expect_kind(value: &ModbusObject, kind: ObjectKind) -> Result<(), InvalidRequest> {
    if value.kind != kind {
        return Err(InvalidRequest::WrongObjectKind(kind, value.kind));
    }
    Ok(())
}

/// Sort a write batch by address and check that it covers one contiguous range
fn contiguous_batch(
    values: &[ModbusObject],
    kind: ObjectKind,
    limit: u16,
) -> Result<(AddressRange, Vec<ModbusObject>), InvalidRequest> {
    for value in values {
        expect_kind(value, kind)?;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by_key(|x| x.address);

    for pair in sorted.windows(2) {
        let (previous, next) = (pair[0].address, pair[1].address);
        if previous == next {
            return Err(InvalidRequest::DuplicateAddress(next));
        }
        if previous.checked_add(1) != Some(next) {
            return Err(InvalidRequest::NonContiguousAddresses(
                previous.wrapping_add(1),
                next,
            ));
        }
    }

    let start = match sorted.first() {
        Some(first) => first.address,
        None => return Err(InvalidRequest::CountOfZero),
    };
    let count = u16::try_from(sorted.len())
        .map_err(|_| InvalidRequest::CountTooLargeForType(u16::MAX, limit))?;

    let range = AddressRange::try_from(start, count)?.limited_count(limit)?;
    Ok((range, sorted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameParseError;

    /// unit id followed by the PDU, nothing else
    struct Bare;

    impl Protocol for Bare {
        fn name(&self) -> &'static str {
            "bare"
        }

        fn encode_adu(&self, unit_id: UnitId, pdu: &[u8]) -> Result<Vec<u8>, RequestError> {
            let mut frame = vec![unit_id.value];
            frame.extend_from_slice(pdu);
            Ok(frame)
        }

        fn decode_adu(&self, frame: &[u8]) -> Result<Adu, RequestError> {
            match frame.split_first() {
                Some((unit_id, pdu)) => Ok(Adu {
                    unit_id: UnitId::new(*unit_id),
                    pdu: pdu.to_vec(),
                }),
                None => Err(FrameParseError::FrameTooShort(0, 1).into()),
            }
        }

        fn check_response_complete(&self, response: &[u8]) -> bool {
            !response.is_empty()
        }
    }

    const UNIT: UnitId = UnitId::new(0x11);

    #[test]
    fn enforces_read_limits() {
        assert!(Bare.serialize_read_coils(UNIT, 0, 2000).is_ok());
        assert_eq!(
            Bare.serialize_read_discrete_inputs(UNIT, 0, 2001),
            Err(RequestError::BadRequest(InvalidRequest::CountTooLargeForType(
                2001, 2000
            )))
        );
        assert!(Bare.serialize_read_input_registers(UNIT, 0, 125).is_ok());
        assert_eq!(
            Bare.serialize_read_holding_registers(UNIT, 0, 126),
            Err(RequestError::BadRequest(InvalidRequest::CountTooLargeForType(
                126, 125
            )))
        );
        assert_eq!(
            Bare.serialize_read_coils(UNIT, 0, 0),
            Err(RequestError::BadRequest(InvalidRequest::CountOfZero))
        );
    }

    #[test]
    fn enforces_write_limits() {
        let coils: Vec<_> = (0..1969).map(|i| ModbusObject::coil(i, true)).collect();
        assert!(Bare.serialize_write_multiple_coils(UNIT, &coils[..1968]).is_ok());
        assert_eq!(
            Bare.serialize_write_multiple_coils(UNIT, &coils),
            Err(RequestError::BadRequest(InvalidRequest::CountTooLargeForType(
                1969, 1968
            )))
        );

        let registers: Vec<_> = (0..124)
            .map(|i| ModbusObject::holding_register(i, i))
            .collect();
        assert!(Bare
            .serialize_write_multiple_registers(UNIT, &registers[..123])
            .is_ok());
        assert_eq!(
            Bare.serialize_write_multiple_registers(UNIT, &registers),
            Err(RequestError::BadRequest(InvalidRequest::CountTooLargeForType(
                124, 123
            )))
        );
        assert_eq!(
            Bare.serialize_write_multiple_registers(UNIT, &[]),
            Err(RequestError::BadRequest(InvalidRequest::CountOfZero))
        );
    }

    #[test]
    fn write_batches_are_sorted_by_address() {
        let registers = [
            ModbusObject::holding_register(11, 0x0102),
            ModbusObject::holding_register(10, 0x000A),
        ];
        assert_eq!(
            Bare.serialize_write_multiple_registers(UNIT, &registers)
                .unwrap(),
            vec![0x11, 0x10, 0x00, 0x0A, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn rejects_duplicate_and_non_contiguous_addresses() {
        let duplicate = [ModbusObject::coil(5, true), ModbusObject::coil(5, false)];
        assert_eq!(
            Bare.serialize_write_multiple_coils(UNIT, &duplicate),
            Err(RequestError::BadRequest(InvalidRequest::DuplicateAddress(5)))
        );

        let gap = [ModbusObject::coil(5, true), ModbusObject::coil(7, false)];
        assert_eq!(
            Bare.serialize_write_multiple_coils(UNIT, &gap),
            Err(RequestError::BadRequest(
                InvalidRequest::NonContiguousAddresses(6, 7)
            ))
        );
    }

    #[test]
    fn rejects_the_wrong_object_kind() {
        assert_eq!(
            Bare.serialize_write_single_coil(UNIT, &ModbusObject::holding_register(1, 1)),
            Err(RequestError::BadRequest(InvalidRequest::WrongObjectKind(
                ObjectKind::Coil,
                ObjectKind::HoldingRegister
            )))
        );
        assert_eq!(
            Bare.serialize_write_multiple_registers(UNIT, &[ModbusObject::input_register(1, 1)]),
            Err(RequestError::BadRequest(InvalidRequest::WrongObjectKind(
                ObjectKind::HoldingRegister,
                ObjectKind::InputRegister
            )))
        );
    }

    #[test]
    fn serializes_write_single_coil() {
        assert_eq!(
            Bare.serialize_write_single_coil(UNIT, &ModbusObject::coil(0x00AC, true))
                .unwrap(),
            vec![0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00]
        );
    }

    #[test]
    fn validate_response_accepts_a_matching_reply() {
        let request = Bare.serialize_read_coils(UNIT, 0, 8).unwrap();
        assert_eq!(Bare.validate_response(&request, &[0x11, 0x01, 0x01, 0x00]), Ok(()));
    }

    #[test]
    fn validate_response_detects_unit_id_mismatch() {
        let request = Bare.serialize_read_coils(UNIT, 0, 8).unwrap();
        assert_eq!(
            Bare.validate_response(&request, &[0x12, 0x01, 0x01, 0x00]),
            Err(RequestError::BadResponse(AduParseError::UnitIdMismatch(
                0x11, 0x12
            )))
        );
    }

    #[test]
    fn validate_response_detects_function_mismatch() {
        let request = Bare.serialize_read_coils(UNIT, 0, 8).unwrap();
        assert_eq!(
            Bare.validate_response(&request, &[0x11, 0x82, 0x02]),
            Err(RequestError::BadResponse(AduParseError::UnexpectedFunction(
                0x82, 0x01
            )))
        );
    }

    #[test]
    fn validate_response_raises_exceptions() {
        let request = Bare.serialize_read_holding_registers(UNIT, 0, 1).unwrap();
        for (code, expected) in [
            (0x01, ExceptionCode::IllegalFunction),
            (0x02, ExceptionCode::IllegalDataAddress),
            (0x03, ExceptionCode::IllegalDataValue),
            (0x04, ExceptionCode::SlaveDeviceFailure),
            (0x05, ExceptionCode::Acknowledge),
            (0x06, ExceptionCode::SlaveDeviceBusy),
            (0x07, ExceptionCode::NegativeAcknowledge),
            (0x08, ExceptionCode::MemoryParityError),
            (0x0A, ExceptionCode::GatewayPath),
            (0x0B, ExceptionCode::GatewayTargetDevice),
        ] {
            assert_eq!(
                Bare.validate_response(&request, &[0x11, 0x83, code]),
                Err(RequestError::Exception(expected))
            );
        }
    }

    #[test]
    fn read_addresses_are_relative_to_the_request() {
        for count in [1u16, 7, 8, 9, 125] {
            let bytes = ((count + 7) / 8) as u8;
            let mut response = vec![0x11, 0x01, bytes];
            response.extend(std::iter::repeat(0xAA).take(bytes as usize));
            let values = Bare.deserialize_read_coils(&response).unwrap();
            for (i, value) in values.iter().enumerate() {
                assert_eq!(value.address, i as u16);
            }
        }
    }
}
