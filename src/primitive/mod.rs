// The cipher/hash primitive registry.
//
// `BlockCipher`/`StreamCipher`/`Hash`/`Mac` are external interfaces this
// crate consumes; an inheritance hierarchy of engine base classes is
// replaced here with these traits plus tagged-variant dispatch through the
// enums in `crate::config` (`BlockCipherAlgorithm`, `StreamCipherAlgorithm`,
// …) rather than a runtime-polymorphic object hierarchy.

pub mod block;
pub mod hash;
pub mod stream;

use crate::config::{
    BlockCipherAlgorithm, HashAlgorithm, KdfAlgorithm, MacAlgorithm, StreamCipherAlgorithm,
};
use crate::error::ConfigError;

/// A block cipher operating on fixed-size blocks under an externally-supplied
/// key (and, for some primitives, IV).
pub trait BlockCipher {
    fn block_size(&self) -> usize;
    fn encrypt_block(&self, input: &[u8], output: &mut [u8]);
    fn decrypt_block(&self, input: &[u8], output: &mut [u8]);
    fn reset(&mut self);
}

/// A stream cipher producing a keystream XORed against plaintext/ciphertext.
pub trait StreamCipher {
    fn state_size(&self) -> usize;
    fn process_bytes(&mut self, input: &[u8], output: &mut [u8]);
    fn reset(&mut self);
    /// Exposes the raw keystream for schedule-CSPRNG use, by XORing against
    /// an all-zero buffer.
    fn get_keystream(&mut self, buf: &mut [u8]) {
        let zeros = vec![0u8; buf.len()];
        self.process_bytes(&zeros, buf);
    }
}

/// An unkeyed digest.
pub trait Hash {
    fn update(&mut self, data: &[u8]);
    fn do_final(&mut self, out: &mut [u8]) -> usize;
    fn reset(&mut self);
    fn output_size(&self) -> usize;
}

/// A keyed MAC, the same shape as [`Hash`] with initialization-before-use.
pub trait Mac {
    fn update(&mut self, data: &[u8]);
    fn do_final(&mut self, out: &mut [u8]) -> usize;
    fn reset(&mut self);
    fn output_size(&self) -> usize;
}

/// Constructs a boxed [`BlockCipher`] for the given algorithm and key.
pub fn make_block_cipher(
    algorithm: BlockCipherAlgorithm,
    key: &[u8],
) -> Result<Box<dyn BlockCipher + Send>, ConfigError> {
    if key.len() != algorithm.key_size() {
        return Err(ConfigError::KeyLengthMismatch {
            expected: algorithm.key_size(),
            actual: key.len(),
        });
    }

    Ok(match algorithm {
        BlockCipherAlgorithm::Aes128 => Box::new(block::AesBlockCipher::new_128(key)),
        BlockCipherAlgorithm::Aes192 => Box::new(block::AesBlockCipher::new_192(key)),
        BlockCipherAlgorithm::Aes256 => Box::new(block::AesBlockCipher::new_256(key)),
    })
}

/// Constructs a boxed [`StreamCipher`] for the given algorithm, key and nonce.
pub fn make_stream_cipher(
    algorithm: StreamCipherAlgorithm,
    key: &[u8],
    nonce: &[u8],
) -> Result<Box<dyn StreamCipher + Send>, ConfigError> {
    if key.len() != algorithm.key_size() {
        return Err(ConfigError::KeyLengthMismatch {
            expected: algorithm.key_size(),
            actual: key.len(),
        });
    }
    if nonce.len() != algorithm.nonce_size() {
        return Err(ConfigError::IvLengthMismatch {
            expected: algorithm.nonce_size(),
            actual: nonce.len(),
        });
    }

    Ok(match algorithm {
        StreamCipherAlgorithm::Salsa20 => Box::new(stream::Salsa20Stream::new(key, nonce)),
        StreamCipherAlgorithm::ChaCha20 => Box::new(stream::ChaCha20Stream::new(key, nonce)),
        StreamCipherAlgorithm::Rabbit => Box::new(stream::RabbitStream::new(key, nonce)),
    })
}

/// Constructs a boxed [`Hash`] for the given algorithm.
pub fn make_hash(algorithm: HashAlgorithm) -> Box<dyn Hash + Send> {
    match algorithm {
        HashAlgorithm::Sha256 => Box::new(hash::Sha256Hash::new()),
    }
}

/// Constructs a boxed [`Mac`] for the given algorithm and key.
pub fn make_mac(algorithm: MacAlgorithm, key: &[u8]) -> Result<Box<dyn Mac + Send>, ConfigError> {
    Ok(match algorithm {
        MacAlgorithm::HmacSha256 => Box::new(hash::HmacSha256Mac::new(key)?),
        MacAlgorithm::CmacAes => Box::new(hash::CmacAesMac::new(key)?),
    })
}

/// Derives `output_len` bytes from `pre_key` using the given KDF, salted with
/// `salt`. Used both for per-item key derivation and key confirmation.
pub fn kdf_derive(
    algorithm: KdfAlgorithm,
    pre_key: &[u8],
    salt: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, ConfigError> {
    match algorithm {
        KdfAlgorithm::Argon2id => hash::argon2id_derive(pre_key, salt, output_len),
    }
}
