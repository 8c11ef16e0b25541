use crate::error::InternalError;

pub(crate) fn num_bytes_for_bits(count: usize) -> usize {
    (count + 7) / 8
}

pub(crate) fn byte_count_for_bits(count: usize) -> Result<u8, InternalError> {
    let bytes = num_bytes_for_bits(count);
    u8::try_from(bytes).map_err(|_| InternalError::BadByteCount(bytes))
}

pub(crate) fn byte_count_for_registers(count: usize) -> Result<u8, InternalError> {
    let bytes = 2 * count;
    u8::try_from(bytes).map_err(|_| InternalError::BadByteCount(bytes))
}

/// pack bits LSB first, as they are transmitted in write multiple coils
pub(crate) fn pack_bits(bits: impl Iterator<Item = bool>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, bit) in bits.enumerate() {
        if i % 8 == 0 {
            bytes.push(0);
        }
        if bit {
            if let Some(last) = bytes.last_mut() {
                *last |= 1 << (i % 8);
            }
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculates_number_of_bytes_needed_for_count_of_packed_bits() {
        assert_eq!(num_bytes_for_bits(7), 1);
        assert_eq!(num_bytes_for_bits(8), 1);
        assert_eq!(num_bytes_for_bits(9), 2);
        assert_eq!(num_bytes_for_bits(0xFFFF), 8192); // ensure that it's free from overflow
    }

    #[test]
    fn rejects_byte_counts_that_do_not_fit_in_u8() {
        assert_eq!(byte_count_for_bits(1968), Ok(246));
        assert_eq!(byte_count_for_registers(123), Ok(246));
        assert_eq!(
            byte_count_for_registers(128),
            Err(InternalError::BadByteCount(256))
        );
    }

    #[test]
    fn packs_bits_least_significant_first() {
        let bits = [true, false, true, true, false, false, true, true, true, false];
        assert_eq!(pack_bits(bits.into_iter()), vec![0xCD, 0x01]);
    }
}
