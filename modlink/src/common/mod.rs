pub(crate) mod bits;
pub(crate) mod checksum;
pub(crate) mod function;
pub(crate) mod pdu;
pub(crate) mod phys;
pub(crate) mod queue;
