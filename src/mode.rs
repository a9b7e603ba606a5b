// Block cipher mode of operation composer.
//
// CBC, CFB and OFB are implemented here as feedback-register state machines
// driven purely through the `crate::primitive::BlockCipher` trait; CTR is a
// counter-mode keystream generator with the same shape. None of these reach
// for `cbc`/`cfb-mode`/`ctr`/`ofb` — mode composition is explicitly the piece
// of the cipher stack this crate owns, as opposed to the primitives
// themselves (`crate::primitive`), which are legitimately bound to RustCrypto
// crates.

use crate::config::BlockMode;
use crate::primitive::BlockCipher;

/// Drives a [`BlockCipher`] under one mode of operation, one block at a time.
///
/// Block-size-granular by design: `crate::cipher_wrapper` is responsible for
/// buffering partial blocks and invoking [`Self::process_block`] only when a
/// full block (or, for CFB/CTR/OFB on the final short block, a partial one)
/// is ready.
pub struct ModeDriver {
    mode: BlockMode,
    block_size: usize,
    /// CBC: previous ciphertext block (encrypt) or the block just consumed
    /// (decrypt). CFB/OFB: the feedback register. CTR: the counter value.
    register: Vec<u8>,
}

impl ModeDriver {
    pub fn new(mode: BlockMode, block_size: usize, iv: &[u8]) -> Self {
        Self {
            mode,
            block_size,
            register: iv.to_vec(),
        }
    }

    pub fn reset(&mut self, iv: &[u8]) {
        self.register.clear();
        self.register.extend_from_slice(iv);
    }

    /// Encrypts one full `block_size`-length block in place.
    pub fn encrypt_block(&mut self, cipher: &dyn BlockCipher, block: &mut [u8]) {
        match self.mode {
            BlockMode::Cbc => {
                for i in 0..self.block_size {
                    block[i] ^= self.register[i];
                }
                let mut out = vec![0u8; self.block_size];
                cipher.encrypt_block(block, &mut out);
                block.copy_from_slice(&out);
                self.register.copy_from_slice(block);
            }
            BlockMode::Cfb => {
                let mut keystream = vec![0u8; self.block_size];
                cipher.encrypt_block(&self.register, &mut keystream);
                for i in 0..self.block_size {
                    block[i] ^= keystream[i];
                }
                self.register.copy_from_slice(block);
            }
            BlockMode::Ofb => {
                let mut keystream = vec![0u8; self.block_size];
                cipher.encrypt_block(&self.register, &mut keystream);
                self.register.copy_from_slice(&keystream);
                for i in 0..self.block_size {
                    block[i] ^= keystream[i];
                }
            }
            BlockMode::Ctr => {
                let mut keystream = vec![0u8; self.block_size];
                cipher.encrypt_block(&self.register, &mut keystream);
                for i in 0..self.block_size {
                    block[i] ^= keystream[i];
                }
                increment_counter(&mut self.register);
            }
        }
    }

    /// Decrypts one full `block_size`-length block in place. For CFB/OFB/CTR
    /// this is identical to encryption (keystream XOR); only CBC differs.
    pub fn decrypt_block(&mut self, cipher: &dyn BlockCipher, block: &mut [u8]) {
        match self.mode {
            BlockMode::Cbc => {
                let prev = self.register.clone();
                let ciphertext_in = block.to_vec();
                let mut decrypted = vec![0u8; self.block_size];
                cipher.decrypt_block(block, &mut decrypted);
                for i in 0..self.block_size {
                    decrypted[i] ^= prev[i];
                }
                block.copy_from_slice(&decrypted);
                self.register.copy_from_slice(&ciphertext_in);
            }
            BlockMode::Cfb => {
                let mut keystream = vec![0u8; self.block_size];
                cipher.encrypt_block(&self.register, &mut keystream);
                let ciphertext_in = block.to_vec();
                for i in 0..self.block_size {
                    block[i] ^= keystream[i];
                }
                self.register.copy_from_slice(&ciphertext_in);
            }
            BlockMode::Ofb => self.encrypt_block(cipher, block),
            BlockMode::Ctr => self.encrypt_block(cipher, block),
        }
    }

    /// XORs a (possibly partial, for the final block under a streaming mode)
    /// keystream segment against `block`, used by CFB/OFB/CTR when the
    /// wrapper hands over fewer than `block_size` bytes at stream end.
    pub fn apply_partial(&mut self, cipher: &dyn BlockCipher, block: &mut [u8], encrypt: bool) {
        debug_assert!(self.mode != BlockMode::Cbc, "CBC requires full blocks");
        let mut keystream = vec![0u8; self.block_size];
        match self.mode {
            BlockMode::Cfb => {
                cipher.encrypt_block(&self.register, &mut keystream);
                let mut next_register = self.register.clone();
                if encrypt {
                    for i in 0..block.len() {
                        block[i] ^= keystream[i];
                    }
                    next_register[..block.len()].copy_from_slice(block);
                } else {
                    let ciphertext_in = block.to_vec();
                    for i in 0..block.len() {
                        block[i] ^= keystream[i];
                    }
                    next_register[..block.len()].copy_from_slice(&ciphertext_in);
                }
                self.register = next_register;
            }
            BlockMode::Ofb => {
                cipher.encrypt_block(&self.register, &mut keystream);
                self.register.copy_from_slice(&keystream);
                for i in 0..block.len() {
                    block[i] ^= keystream[i];
                }
            }
            BlockMode::Ctr => {
                cipher.encrypt_block(&self.register, &mut keystream);
                for i in 0..block.len() {
                    block[i] ^= keystream[i];
                }
                increment_counter(&mut self.register);
            }
            BlockMode::Cbc => unreachable!(),
        }
    }
}

fn increment_counter(counter: &mut [u8]) {
    for byte in counter.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::block::AesBlockCipher;
    use hex_literal::hex;

    #[test]
    fn ctr_matches_nist_sp800_38a_vector() {
        // NIST SP 800-38A, F.5.1 CTR-AES128 Encrypt, first block.
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let icb = hex!("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
        let plaintext = hex!("6bc1bee22e409f96e93d7e117393172a");
        let expected = hex!("874d6191b620e3261bef6864990db6ce");

        let cipher = AesBlockCipher::new_128(&key);
        let mut driver = ModeDriver::new(BlockMode::Ctr, 16, &icb);
        let mut block = plaintext;
        driver.encrypt_block(&cipher, &mut block);
        assert_eq!(block, expected);
    }

    #[test]
    fn cbc_encrypt_decrypt_round_trip() {
        let key = [0u8; 16];
        let iv = [1u8; 16];
        let cipher = AesBlockCipher::new_128(&key);

        let plaintext = *b"YELLOW SUBMARINE";
        let mut block = plaintext;
        let mut enc = ModeDriver::new(BlockMode::Cbc, 16, &iv);
        enc.encrypt_block(&cipher, &mut block);
        assert_ne!(block, plaintext);

        let mut dec = ModeDriver::new(BlockMode::Cbc, 16, &iv);
        dec.decrypt_block(&cipher, &mut block);
        assert_eq!(block, plaintext);
    }

    #[test]
    fn cfb_encrypt_decrypt_round_trip_over_multiple_blocks() {
        let key = [7u8; 16];
        let iv = [2u8; 16];
        let cipher = AesBlockCipher::new_128(&key);

        let plaintext = [*b"YELLOW SUBMARINE", *b"ANOTHER BLOCK!!!"];
        let mut blocks = plaintext;

        let mut enc = ModeDriver::new(BlockMode::Cfb, 16, &iv);
        for b in blocks.iter_mut() {
            enc.encrypt_block(&cipher, b);
        }
        assert_ne!(blocks, plaintext);

        let mut dec = ModeDriver::new(BlockMode::Cfb, 16, &iv);
        for b in blocks.iter_mut() {
            dec.decrypt_block(&cipher, b);
        }
        assert_eq!(blocks, plaintext);
    }

    #[test]
    fn ofb_encrypt_is_its_own_inverse() {
        let key = [9u8; 16];
        let iv = [3u8; 16];
        let cipher = AesBlockCipher::new_128(&key);

        let plaintext = *b"YELLOW SUBMARINE";
        let mut block = plaintext;
        let mut enc = ModeDriver::new(BlockMode::Ofb, 16, &iv);
        enc.encrypt_block(&cipher, &mut block);

        let mut dec = ModeDriver::new(BlockMode::Ofb, 16, &iv);
        dec.decrypt_block(&cipher, &mut block);
        assert_eq!(block, plaintext);
    }

    #[test]
    fn ctr_handles_partial_final_block() {
        let key = [4u8; 16];
        let iv = [5u8; 16];
        let cipher = AesBlockCipher::new_128(&key);

        let plaintext = *b"hi!";
        let mut block = plaintext;
        let mut enc = ModeDriver::new(BlockMode::Ctr, 16, &iv);
        enc.apply_partial(&cipher, &mut block, true);
        assert_ne!(block, plaintext);

        let mut dec = ModeDriver::new(BlockMode::Ctr, 16, &iv);
        dec.apply_partial(&cipher, &mut block, false);
        assert_eq!(block, plaintext);
    }

    #[test]
    fn counter_increment_wraps_across_byte_boundary() {
        let mut counter = vec![0u8, 0u8, 0xFF];
        increment_counter(&mut counter);
        assert_eq!(counter, vec![0u8, 1u8, 0u8]);
    }
}
