// AES-128/192/256 block cipher binding.
//
// `aes` is a RustCrypto crate in the same family as `chacha20`/`hmac`/`sha2`.
// The raw 16-byte block operation is all this module exposes —
// mode-of-operation composition (CBC/CFB/CTR/OFB) lives in `crate::mode`,
// kept deliberately separate so each side has one job.

use super::BlockCipher;

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};

enum Inner {
    Aes128(Box<Aes128>),
    Aes192(Box<Aes192>),
    Aes256(Box<Aes256>),
}

/// A [`BlockCipher`] implementation backed by the `aes` crate.
pub struct AesBlockCipher {
    inner: Inner,
    key: Vec<u8>,
}

impl AesBlockCipher {
    pub fn new_128(key: &[u8]) -> Self {
        Self {
            inner: Inner::Aes128(Box::new(Aes128::new(GenericArray::from_slice(key)))),
            key: key.to_vec(),
        }
    }

    pub fn new_192(key: &[u8]) -> Self {
        Self {
            inner: Inner::Aes192(Box::new(Aes192::new(GenericArray::from_slice(key)))),
            key: key.to_vec(),
        }
    }

    pub fn new_256(key: &[u8]) -> Self {
        Self {
            inner: Inner::Aes256(Box::new(Aes256::new(GenericArray::from_slice(key)))),
            key: key.to_vec(),
        }
    }
}

impl BlockCipher for AesBlockCipher {
    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let mut block = *GenericArray::from_slice(input);
        match &self.inner {
            Inner::Aes128(c) => c.encrypt_block(&mut block),
            Inner::Aes192(c) => c.encrypt_block(&mut block),
            Inner::Aes256(c) => c.encrypt_block(&mut block),
        }
        output[..16].copy_from_slice(&block);
    }

    fn decrypt_block(&self, input: &[u8], output: &mut [u8]) {
        let mut block = *GenericArray::from_slice(input);
        match &self.inner {
            Inner::Aes128(c) => c.decrypt_block(&mut block),
            Inner::Aes192(c) => c.decrypt_block(&mut block),
            Inner::Aes256(c) => c.decrypt_block(&mut block),
        }
        output[..16].copy_from_slice(&block);
    }

    fn reset(&mut self) {
        // Re-key from the retained key bytes. Keys are not zeroised on reset,
        // only on drop.
        self.inner = match self.key.len() {
            16 => Inner::Aes128(Box::new(Aes128::new(GenericArray::from_slice(&self.key)))),
            24 => Inner::Aes192(Box::new(Aes192::new(GenericArray::from_slice(&self.key)))),
            32 => Inner::Aes256(Box::new(Aes256::new(GenericArray::from_slice(&self.key)))),
            other => unreachable!("AES key length validated at construction time: {other}"),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn aes128_encrypt_decrypt_round_trip() {
        let key = [0u8; 16];
        let cipher = AesBlockCipher::new_128(&key);
        let plaintext = *b"YELLOW SUBMARINE";
        let mut ciphertext = [0u8; 16];
        cipher.encrypt_block(&plaintext, &mut ciphertext);

        let mut decrypted = [0u8; 16];
        cipher.decrypt_block(&ciphertext, &mut decrypted);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn aes128_matches_fips197_vector() {
        // FIPS-197 Appendix B test vector.
        let key = hex!("000102030405060708090a0b0c0d0e0f");
        let plaintext = hex!("00112233445566778899aabbccddeeff");
        let expected = hex!("69c4e0d86a7b0430d8cdb78070b4c55a");

        let cipher = AesBlockCipher::new_128(&key);
        let mut ciphertext = [0u8; 16];
        cipher.encrypt_block(&plaintext, &mut ciphertext);
        assert_eq!(ciphertext, expected);
    }
}
