use crate::constants::coil;
use crate::error::{AduParseError, InvalidRequest};

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

impl UnitId {
    /// create a unit id from its raw value
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    /// broadcast address used on serial lines
    pub const fn broadcast() -> Self {
        Self { value: 0x00 }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Start and count tuple used when making read requests
/// Cannot be constructed with invalid start/count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of elements in the range
    pub count: u16,
}

impl AddressRange {
    /// Create a new address range
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRequest> {
        if count == 0 {
            return Err(InvalidRequest::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);

        if start > max_start {
            return Err(InvalidRequest::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    pub(crate) fn limited_count(self, limit: u16) -> Result<Self, InvalidRequest> {
        if self.count > limit {
            return Err(InvalidRequest::CountTooLargeForType(self.count, limit));
        }
        Ok(self)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

/// The four Modbus data tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// single-bit, read-write
    Coil,
    /// single-bit, read-only
    DiscreteInput,
    /// 16-bit, read-write
    HoldingRegister,
    /// 16-bit, read-only
    InputRegister,
}

impl ObjectKind {
    /// true for coils and discrete inputs
    pub fn is_bit(self) -> bool {
        matches!(self, ObjectKind::Coil | ObjectKind::DiscreteInput)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Coil => f.write_str("coil"),
            ObjectKind::DiscreteInput => f.write_str("discrete input"),
            ObjectKind::HoldingRegister => f.write_str("holding register"),
            ObjectKind::InputRegister => f.write_str("input register"),
        }
    }
}

/// A single Modbus data point
///
/// The address together with the two value bytes fully determines the wire representation.
/// Bits are ON when the high byte is `0xFF`, registers are the big-endian combination of both
/// bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModbusObject {
    /// data table this value belongs to
    pub kind: ObjectKind,
    /// address of the value
    pub address: u16,
    /// most significant byte of the value
    pub high_byte: u8,
    /// least significant byte of the value
    pub low_byte: u8,
}

impl ModbusObject {
    /// construct from raw bytes
    pub const fn new(kind: ObjectKind, address: u16, high_byte: u8, low_byte: u8) -> Self {
        Self {
            kind,
            address,
            high_byte,
            low_byte,
        }
    }

    /// construct a coil
    pub fn coil(address: u16, value: bool) -> Self {
        Self::from_bool(ObjectKind::Coil, address, value)
    }

    /// construct a discrete input
    pub fn discrete_input(address: u16, value: bool) -> Self {
        Self::from_bool(ObjectKind::DiscreteInput, address, value)
    }

    /// construct a holding register
    pub fn holding_register(address: u16, value: u16) -> Self {
        Self::from_u16(ObjectKind::HoldingRegister, address, value)
    }

    /// construct an input register
    pub fn input_register(address: u16, value: u16) -> Self {
        Self::from_u16(ObjectKind::InputRegister, address, value)
    }

    pub(crate) fn from_bool(kind: ObjectKind, address: u16, value: bool) -> Self {
        let high_byte = if value { coil::ON_HIGH_BYTE } else { 0x00 };
        Self::new(kind, address, high_byte, 0x00)
    }

    pub(crate) fn from_u16(kind: ObjectKind, address: u16, value: u16) -> Self {
        let [high_byte, low_byte] = value.to_be_bytes();
        Self::new(kind, address, high_byte, low_byte)
    }

    /// boolean view of the value, true when the high byte is `0xFF`
    pub fn as_bool(&self) -> bool {
        self.high_byte == coil::ON_HIGH_BYTE
    }

    /// 16-bit view of the value
    pub fn as_u16(&self) -> u16 {
        u16::from_be_bytes([self.high_byte, self.low_byte])
    }

    pub(crate) fn coil_value(&self) -> u16 {
        coil_to_u16(self.as_bool())
    }
}

impl std::fmt::Display for ModbusObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind.is_bit() {
            write!(f, "{} {}: {}", self.kind, self.address, self.as_bool())
        } else {
            write!(f, "{} {}: {}", self.kind, self.address, self.as_u16())
        }
    }
}

pub(crate) fn coil_from_u16(value: u16) -> Result<bool, AduParseError> {
    match value {
        coil::ON => Ok(true),
        coil::OFF => Ok(false),
        _ => Err(AduParseError::UnknownCoilState(value)),
    }
}

pub(crate) fn coil_to_u16(value: bool) -> u16 {
    if value {
        coil::ON
    } else {
        coil::OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_start_max_count_of_one_is_allowed() {
        AddressRange::try_from(u16::MAX, 1).unwrap();
    }

    #[test]
    fn address_maximum_range_is_ok() {
        AddressRange::try_from(0, 0xFFFF).unwrap();
    }

    #[test]
    fn address_count_zero_fails_validation() {
        assert_eq!(
            AddressRange::try_from(0, 0),
            Err(InvalidRequest::CountOfZero)
        );
    }

    #[test]
    fn start_max_count_of_two_overflows() {
        assert_eq!(
            AddressRange::try_from(u16::MAX, 2),
            Err(InvalidRequest::AddressOverflow(u16::MAX, 2))
        );
    }

    #[test]
    fn bits_are_derived_from_the_high_byte() {
        assert!(ModbusObject::coil(1, true).as_bool());
        assert!(!ModbusObject::new(ObjectKind::Coil, 1, 0x01, 0x00).as_bool());
        assert_eq!(ModbusObject::coil(1, true).high_byte, 0xFF);
    }

    #[test]
    fn registers_are_big_endian() {
        let register = ModbusObject::holding_register(7, 0x1234);
        assert_eq!(register.high_byte, 0x12);
        assert_eq!(register.low_byte, 0x34);
        assert_eq!(register.as_u16(), 0x1234);
    }

    #[test]
    fn equality_includes_the_kind() {
        assert_ne!(
            ModbusObject::coil(3, true),
            ModbusObject::discrete_input(3, true)
        );
        assert_eq!(
            ModbusObject::holding_register(3, 0xCAFE),
            ModbusObject::new(ObjectKind::HoldingRegister, 3, 0xCA, 0xFE)
        );
    }
}
