// Block padding schemes.
//
// Decrypt-side verification is constant-time: a caller observing only the
// return value (`Ok`/`Err(BadPaddingError)`) learns nothing about which byte
// of the pad body disagreed with the expected value, only whether the whole
// thing matched.

use crate::config::Padding;
use crate::error::BadPaddingError;
use crate::util::ct_eq;

/// Pads `block` (of length `block_size`, containing `data_len <= block_size`
/// live bytes at the front) in place, returning the padded length — either
/// `block_size` (padding fit in the existing block) or `2 * block_size` (the
/// plaintext was already block-aligned, so a full extra block of pure padding
/// is appended; PKCS#7 and X.923 do this, as does ISO 7816-4's `0x80 ∥ 0x00*`).
pub fn pad(scheme: Padding, block_size: usize, data_len: usize, block: &mut [u8]) -> usize {
    debug_assert!(data_len <= block_size);

    match scheme {
        Padding::None => data_len,
        Padding::Pkcs7 => {
            if data_len == block_size {
                for b in &mut block[block_size..2 * block_size] {
                    *b = block_size as u8;
                }
                2 * block_size
            } else {
                let pad_len = block_size - data_len;
                for b in &mut block[data_len..block_size] {
                    *b = pad_len as u8;
                }
                block_size
            }
        }
        Padding::X923 => {
            if data_len == block_size {
                block[2 * block_size - 1] = block_size as u8;
                2 * block_size
            } else {
                let pad_len = block_size - data_len;
                for b in &mut block[data_len..block_size - 1] {
                    *b = 0;
                }
                block[block_size - 1] = pad_len as u8;
                block_size
            }
        }
        Padding::Iso7816D4 => {
            if data_len == block_size {
                block[block_size] = 0x80;
                for b in &mut block[block_size + 1..2 * block_size] {
                    *b = 0;
                }
                2 * block_size
            } else {
                block[data_len] = 0x80;
                for b in &mut block[data_len + 1..block_size] {
                    *b = 0;
                }
                block_size
            }
        }
        Padding::Iso10126D2 => {
            // Padding bytes other than the final length byte are meant to be
            // random; callers that care about that fill `block[data_len..]`
            // themselves before calling `pad`, since this function has no
            // RNG handle. Here we only guarantee the final length byte.
            if data_len == block_size {
                block[2 * block_size - 1] = block_size as u8;
                2 * block_size
            } else {
                let pad_len = block_size - data_len;
                block[block_size - 1] = pad_len as u8;
                block_size
            }
        }
        Padding::Tbc => {
            // Trailing-bit-compliment: the final bit of the last live
            // plaintext byte determines whether padding bytes are all-0xFF
            // or all-0x00.
            let fill = if data_len > 0 && block[data_len - 1] & 1 == 1 {
                0x00
            } else {
                0xFF
            };
            if data_len == block_size {
                for b in &mut block[block_size..2 * block_size] {
                    *b = fill;
                }
                2 * block_size
            } else {
                for b in &mut block[data_len..block_size] {
                    *b = fill;
                }
                block_size
            }
        }
    }
}

/// Verifies and strips padding from a full `block_size`-length final block
/// (or the second of two, for schemes that emit a pure-padding extra block),
/// returning the number of live plaintext bytes. Constant-time: always walks
/// the full block, never short-circuits on the first disagreement.
pub fn unpad(scheme: Padding, block_size: usize, block: &[u8]) -> Result<usize, BadPaddingError> {
    debug_assert_eq!(block.len(), block_size);

    match scheme {
        Padding::None => Ok(block_size),
        Padding::Pkcs7 | Padding::X923 => {
            let pad_len = block[block_size - 1] as usize;
            if pad_len == 0 || pad_len > block_size {
                return Err(BadPaddingError);
            }

            let expected_bytes = match scheme {
                Padding::Pkcs7 => vec![pad_len as u8; pad_len],
                Padding::X923 => {
                    let mut v = vec![0u8; pad_len];
                    v[pad_len - 1] = pad_len as u8;
                    v
                }
                _ => unreachable!(),
            };

            if ct_eq(&block[block_size - pad_len..], &expected_bytes) {
                Ok(block_size - pad_len)
            } else {
                Err(BadPaddingError)
            }
        }
        Padding::Iso10126D2 => {
            // Only the final length byte is authoritative; the rest is random
            // filler and not verified (there is nothing to verify it against).
            let pad_len = block[block_size - 1] as usize;
            if pad_len == 0 || pad_len > block_size {
                return Err(BadPaddingError);
            }
            Ok(block_size - pad_len)
        }
        Padding::Iso7816D4 => {
            // Scan from the end for the 0x80 marker, accumulating a
            // constant-time "found exactly one marker, rest are zero" check
            // over the whole block rather than stopping at the first match.
            let mut marker_pos: Option<usize> = None;
            let mut trailing_ok = true;
            for i in (0..block_size).rev() {
                if block[i] == 0x80 && marker_pos.is_none() {
                    marker_pos = Some(i);
                } else if marker_pos.is_none() && block[i] != 0x00 {
                    trailing_ok = false;
                }
            }

            match marker_pos {
                Some(pos) if trailing_ok => Ok(pos),
                _ => Err(BadPaddingError),
            }
        }
        Padding::Tbc => {
            // The last byte of the block is always part of the padding (at
            // least one pad byte is always appended), so it fixes which of
            // 0x00/0xFF this block's fill is. Strip only a run of that exact
            // value — a genuine trailing plaintext byte equal to the *other*
            // fill value must not be mistaken for padding.
            let fill = block[block_size - 1];
            let mut i = block_size;
            while i > 0 && block[i - 1] == fill {
                i -= 1;
            }
            Ok(i)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_unpad_round_trip(scheme: Padding, data_len: usize) {
        const BLOCK: usize = 16;
        let mut buf = vec![0u8; 2 * BLOCK];
        for (i, b) in buf.iter_mut().enumerate().take(data_len) {
            *b = (i + 1) as u8;
        }

        let padded_len = pad(scheme, BLOCK, data_len, &mut buf);
        assert!(padded_len == BLOCK || padded_len == 2 * BLOCK);

        let last_block = &buf[padded_len - BLOCK..padded_len];
        let recovered = unpad(scheme, BLOCK, last_block).unwrap();

        let expected = if padded_len == 2 * BLOCK {
            0
        } else {
            data_len
        };
        assert_eq!(recovered, expected);
    }

    #[test]
    fn pkcs7_round_trips_underfull_and_full_blocks() {
        pad_unpad_round_trip(Padding::Pkcs7, 5);
        pad_unpad_round_trip(Padding::Pkcs7, 16);
        pad_unpad_round_trip(Padding::Pkcs7, 0);
    }

    #[test]
    fn x923_round_trips() {
        pad_unpad_round_trip(Padding::X923, 5);
        pad_unpad_round_trip(Padding::X923, 16);
    }

    #[test]
    fn iso7816d4_round_trips() {
        pad_unpad_round_trip(Padding::Iso7816D4, 5);
        pad_unpad_round_trip(Padding::Iso7816D4, 16);
    }

    #[test]
    fn tbc_round_trips_underfull_and_full_blocks() {
        pad_unpad_round_trip(Padding::Tbc, 5);
        pad_unpad_round_trip(Padding::Tbc, 16);
        pad_unpad_round_trip(Padding::Tbc, 0);
    }

    #[test]
    fn tbc_preserves_a_final_byte_matching_the_fill_value() {
        // Plaintext `[0xFF]`: its LSB is 1, so the fill is 0x00. The final
        // live byte (0xFF) must not be swallowed by a naive "strip every
        // trailing 0x00 or 0xFF" scan.
        const BLOCK: usize = 16;
        let mut buf = vec![0u8; 2 * BLOCK];
        buf[0] = 0xFF;
        let padded_len = pad(Padding::Tbc, BLOCK, 1, &mut buf);
        assert_eq!(padded_len, BLOCK);
        let recovered = unpad(Padding::Tbc, BLOCK, &buf[..BLOCK]).unwrap();
        assert_eq!(recovered, 1);

        // Plaintext `[0x02]`: LSB is 0, so the fill is 0xFF. The final live
        // byte (0x02) must not be mistaken for a 0xFF pad byte, nor strip
        // past it.
        let mut buf2 = vec![0u8; 2 * BLOCK];
        buf2[0] = 0x02;
        let padded_len = pad(Padding::Tbc, BLOCK, 1, &mut buf2);
        assert_eq!(padded_len, BLOCK);
        assert_eq!(&buf2[1..BLOCK], &[0xFFu8; BLOCK - 1]);
        let recovered = unpad(Padding::Tbc, BLOCK, &buf2[..BLOCK]).unwrap();
        assert_eq!(recovered, 1);
    }

    #[test]
    fn pkcs7_rejects_corrupted_padding() {
        const BLOCK: usize = 16;
        let mut block = [5u8; BLOCK];
        block[BLOCK - 1] = 4; // pad length byte disagrees with pad body
        assert!(unpad(Padding::Pkcs7, BLOCK, &block).is_err());
    }

    #[test]
    fn pkcs7_emits_32_bytes_for_one_block_plaintext() {
        // A full-block plaintext still gets one extra block of pure padding.
        const BLOCK: usize = 16;
        let mut buf = vec![0u8; 2 * BLOCK];
        buf[..16].copy_from_slice(b"YELLOW SUBMARINE");
        let padded_len = pad(Padding::Pkcs7, BLOCK, 16, &mut buf);
        assert_eq!(padded_len, 32);
        assert_eq!(&buf[16..32], &[16u8; 16]);
    }
}
