pub(crate) mod coil {
    /// u16 representation of COIL == ON when performing write single coil
    pub(crate) const ON: u16 = 0xFF00;
    /// u16 representation of COIL == OFF when performing write single coil
    pub(crate) const OFF: u16 = 0x0000;
    /// high byte of a coil or discrete input that is ON
    pub(crate) const ON_HIGH_BYTE: u8 = 0xFF;
}

pub(crate) mod limits {
    /// Maximum count allowed in a read coils/discrete inputs request
    pub(crate) const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding/input registers request
    pub(crate) const MAX_READ_REGISTERS_COUNT: u16 = 0x007D;
    /// Maximum count allowed in a `write multiple coils` request
    pub(crate) const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Maximum count allowed in a `write multiple registers` request
    pub(crate) const MAX_WRITE_REGISTERS_COUNT: u16 = 0x007B;
    /// Maximum size of a PDU (function code + payload)
    pub(crate) const MAX_PDU_LENGTH: usize = 253;
    /// Upper bound on the size of any response the connection accumulates (ASCII is the largest)
    pub(crate) const MAX_RESPONSE_LENGTH: usize = 1 + 2 * (1 + MAX_PDU_LENGTH + 1) + 2;
}

pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SLAVE_DEVICE_FAILURE: u8 = 0x04;
    pub(crate) const ACKNOWLEDGE: u8 = 0x05;
    pub(crate) const SLAVE_DEVICE_BUSY: u8 = 0x06;
    pub(crate) const NEGATIVE_ACKNOWLEDGE: u8 = 0x07;
    pub(crate) const MEMORY_PARITY_ERROR: u8 = 0x08;
    pub(crate) const GATEWAY_PATH: u8 = 0x0A;
    pub(crate) const GATEWAY_TARGET_DEVICE: u8 = 0x0B;
}

pub(crate) mod mei {
    /// MEI type used by Read Device Identification
    pub(crate) const READ_DEVICE_ID: u8 = 0x0E;
    /// value of the "more follows" field when further pages exist
    pub(crate) const MORE_FOLLOWS: u8 = 0xFF;
    /// bit in the conformity level signalling that individual access is supported
    pub(crate) const INDIVIDUAL_ACCESS_BIT: u8 = 0x80;
}
