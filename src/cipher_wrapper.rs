// Uniform cipher wrapper contract.
//
// `CipherWrapper` is the one interface `crate::cipher_stream::CipherStream`
// talks to; it never knows whether it is driving a block mode or a raw
// stream cipher underneath.

use crate::config::{BlockMode, Padding};
use crate::error::{BadPaddingError, ConfigError};
use crate::mode::ModeDriver;
use crate::padding;
use crate::primitive::{BlockCipher, StreamCipher};

/// How many native keystream-state-widths make up one stream cipher stride:
/// `stride = native_state_size << STRIDE_INCREASE_FACTOR`.
pub const STRIDE_INCREASE_FACTOR: u32 = 2;

pub trait CipherWrapper {
    /// The unit of work: block size for block modes, stride for stream ciphers.
    fn operation_size(&self) -> usize;
    /// Max byte difference between input and output length for one operation.
    /// Positive on encrypt under padding, negative on decrypt, 0 otherwise.
    fn max_delta(&self, encrypting: bool) -> isize;
    /// Consumes exactly `operation_size` input bytes, returns bytes written to `out`.
    fn process(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize, BadPaddingError>;
    /// Finalises: `input_len < operation_size` (or `== operation_size` for the
    /// held-back decrypt block, or `0`). May emit 0, 1 or 2 operation-sized outputs.
    fn process_final(
        &mut self,
        input: &[u8],
        input_len: usize,
        out: &mut [u8],
    ) -> Result<usize, BadPaddingError>;
    /// Restores post-init state (IV/counter reloaded). Keys are not zeroised.
    fn reset(&mut self);
}

/// Wraps a [`BlockCipher`] under a mode of operation and, for CBC, a padding
/// scheme. `encrypting` is fixed at construction — a `CipherStream` opened for
/// reading never calls the encrypt path and vice versa.
pub struct BlockCipherWrapper {
    cipher: Box<dyn BlockCipher + Send>,
    driver: ModeDriver,
    mode: BlockMode,
    padding: Padding,
    block_size: usize,
    encrypting: bool,
    iv: Vec<u8>,
}

impl BlockCipherWrapper {
    pub fn new(
        cipher: Box<dyn BlockCipher + Send>,
        mode: BlockMode,
        padding: Padding,
        iv: &[u8],
        encrypting: bool,
    ) -> Result<Self, ConfigError> {
        let padding_ok = match mode {
            BlockMode::Cbc => padding != Padding::None,
            BlockMode::Cfb | BlockMode::Ctr | BlockMode::Ofb => padding == Padding::None,
        };
        if !padding_ok {
            return if mode == BlockMode::Cbc {
                Err(ConfigError::PaddingRequired)
            } else {
                Err(ConfigError::PaddingForbidden(padding))
            };
        }

        let block_size = cipher.block_size();
        let driver = ModeDriver::new(mode, block_size, iv);
        Ok(Self {
            cipher,
            driver,
            mode,
            padding,
            block_size,
            encrypting,
            iv: iv.to_vec(),
        })
    }
}

impl CipherWrapper for BlockCipherWrapper {
    fn operation_size(&self) -> usize {
        self.block_size
    }

    fn max_delta(&self, encrypting: bool) -> isize {
        if self.padding == Padding::None {
            return 0;
        }
        if encrypting {
            self.block_size as isize
        } else {
            -(self.block_size as isize)
        }
    }

    fn process(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize, BadPaddingError> {
        let mut block = input[..self.block_size].to_vec();
        if self.encrypting {
            self.driver.encrypt_block(self.cipher.as_ref(), &mut block);
        } else {
            self.driver.decrypt_block(self.cipher.as_ref(), &mut block);
        }
        out[..self.block_size].copy_from_slice(&block);
        Ok(self.block_size)
    }

    fn process_final(
        &mut self,
        input: &[u8],
        input_len: usize,
        out: &mut [u8],
    ) -> Result<usize, BadPaddingError> {
        if self.padding == Padding::None {
            if input_len == 0 {
                return Ok(0);
            }
            let mut block = input[..input_len].to_vec();
            if self.encrypting {
                self.driver
                    .apply_partial(self.cipher.as_ref(), &mut block, true);
            } else {
                self.driver
                    .apply_partial(self.cipher.as_ref(), &mut block, false);
            }
            out[..input_len].copy_from_slice(&block);
            return Ok(input_len);
        }

        if self.encrypting {
            let mut buf = vec![0u8; 2 * self.block_size];
            buf[..input_len].copy_from_slice(&input[..input_len]);
            let padded_len = padding::pad(self.padding, self.block_size, input_len, &mut buf);

            let mut written = 0;
            let mut offset = 0;
            while offset < padded_len {
                let mut block = buf[offset..offset + self.block_size].to_vec();
                self.driver.encrypt_block(self.cipher.as_ref(), &mut block);
                out[written..written + self.block_size].copy_from_slice(&block);
                written += self.block_size;
                offset += self.block_size;
            }
            Ok(written)
        } else {
            if input_len == 0 {
                return Ok(0);
            }
            debug_assert_eq!(input_len, self.block_size, "held-back decrypt block must be full");
            let mut block = input[..self.block_size].to_vec();
            self.driver.decrypt_block(self.cipher.as_ref(), &mut block);
            let live_len = padding::unpad(self.padding, self.block_size, &block)?;
            out[..live_len].copy_from_slice(&block[..live_len]);
            Ok(live_len)
        }
    }

    fn reset(&mut self) {
        self.cipher.reset();
        self.driver.reset(&self.iv);
    }
}

/// Wraps a raw [`StreamCipher`] at a stride of `state_size << STRIDE_INCREASE_FACTOR`.
pub struct StreamCipherWrapper {
    cipher: Box<dyn StreamCipher + Send>,
    operation_size: usize,
}

impl StreamCipherWrapper {
    pub fn new(cipher: Box<dyn StreamCipher + Send>) -> Self {
        let operation_size = cipher.state_size() << STRIDE_INCREASE_FACTOR;
        Self {
            cipher,
            operation_size,
        }
    }
}

impl CipherWrapper for StreamCipherWrapper {
    fn operation_size(&self) -> usize {
        self.operation_size
    }

    fn max_delta(&self, _encrypting: bool) -> isize {
        0
    }

    fn process(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize, BadPaddingError> {
        self.cipher
            .process_bytes(&input[..self.operation_size], &mut out[..self.operation_size]);
        Ok(self.operation_size)
    }

    fn process_final(
        &mut self,
        input: &[u8],
        input_len: usize,
        out: &mut [u8],
    ) -> Result<usize, BadPaddingError> {
        if input_len == 0 {
            return Ok(0);
        }
        self.cipher
            .process_bytes(&input[..input_len], &mut out[..input_len]);
        Ok(input_len)
    }

    fn reset(&mut self) {
        self.cipher.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::block::AesBlockCipher;
    use crate::primitive::stream::ChaCha20Stream;

    #[test]
    fn block_wrapper_ctr_round_trips_full_operation() {
        let key = [1u8; 16];
        let iv = [2u8; 16];
        let plaintext = *b"YELLOW SUBMARINE";

        let mut enc = BlockCipherWrapper::new(
            Box::new(AesBlockCipher::new_128(&key)),
            BlockMode::Ctr,
            Padding::None,
            &iv,
            true,
        )
        .unwrap();
        let mut ciphertext = [0u8; 16];
        enc.process(&plaintext, &mut ciphertext).unwrap();

        let mut dec = BlockCipherWrapper::new(
            Box::new(AesBlockCipher::new_128(&key)),
            BlockMode::Ctr,
            Padding::None,
            &iv,
            false,
        )
        .unwrap();
        let mut decrypted = [0u8; 16];
        dec.process(&ciphertext, &mut decrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn block_wrapper_cbc_pkcs7_final_expands_one_full_block() {
        let key = [0u8; 16];
        let iv = [0u8; 16];

        let mut enc = BlockCipherWrapper::new(
            Box::new(AesBlockCipher::new_128(&key)),
            BlockMode::Cbc,
            Padding::Pkcs7,
            &iv,
            true,
        )
        .unwrap();

        let plaintext = b"YELLOW SUBMARINE";
        let mut out = [0u8; 32];
        let n = enc.process(plaintext, &mut out).unwrap();
        assert_eq!(n, 16);
        let final_n = enc
            .process_final(&[], 0, &mut out[16..])
            .unwrap();
        assert_eq!(final_n, 16);

        let mut dec = BlockCipherWrapper::new(
            Box::new(AesBlockCipher::new_128(&key)),
            BlockMode::Cbc,
            Padding::Pkcs7,
            &iv,
            false,
        )
        .unwrap();
        let mut first_plain = [0u8; 16];
        dec.process(&out[..16], &mut first_plain).unwrap();
        assert_eq!(&first_plain, plaintext);

        let mut second_plain = [0u8; 16];
        let live = dec
            .process_final(&out[16..32], 16, &mut second_plain)
            .unwrap();
        assert_eq!(live, 0);
    }

    #[test]
    fn stream_wrapper_operation_size_is_state_size_shifted() {
        let cipher = ChaCha20Stream::new(&[0u8; 32], &[0u8; 12]);
        let wrapper = StreamCipherWrapper::new(Box::new(cipher));
        assert_eq!(wrapper.operation_size(), 64 << STRIDE_INCREASE_FACTOR);
    }

    #[test]
    fn stream_wrapper_final_xors_residual_and_returns_input_len() {
        let cipher = ChaCha20Stream::new(&[0u8; 32], &[0u8; 12]);
        let mut wrapper = StreamCipherWrapper::new(Box::new(cipher));
        let input = b"short tail";
        let mut out = [0u8; 10];
        let n = wrapper.process_final(input, input.len(), &mut out).unwrap();
        assert_eq!(n, input.len());
        assert_ne!(&out[..], &input[..]);
    }
}
