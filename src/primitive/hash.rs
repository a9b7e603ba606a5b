// SHA-256 hash, HMAC-SHA256 / CMAC-AES MAC, and Argon2id KDF bindings.
//
// `sha2`, `hmac` and `argon2` carry over from this crate's existing hashing
// and KDF bindings; `cmac` is added as the matching RustCrypto family crate
// for the CMAC-over-a-block-cipher MAC this crate also supports.

use super::{Hash, Mac};
use crate::error::ConfigError;

use aes::Aes128;
use cmac::Cmac;
use hmac::Hmac;
use sha2::{Digest, Sha256};

use hmac::Mac as _RcMacInit;
use cmac::Mac as _RcCmacInit;

/// A [`Hash`] implementation backed by `sha2::Sha256`.
pub struct Sha256Hash {
    inner: Sha256,
}

impl Sha256Hash {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }
}

impl Default for Sha256Hash {
    fn default() -> Self {
        Self::new()
    }
}

impl Hash for Sha256Hash {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    fn do_final(&mut self, out: &mut [u8]) -> usize {
        let digest = std::mem::replace(&mut self.inner, Sha256::new()).finalize();
        out[..32].copy_from_slice(&digest);
        32
    }

    fn reset(&mut self) {
        self.inner = Sha256::new();
    }

    fn output_size(&self) -> usize {
        32
    }
}

/// A [`Mac`] implementation backed by `hmac::Hmac<Sha256>`.
///
/// `reset()` restores the state *post-init* — the key is retained.
pub struct HmacSha256Mac {
    inner: Hmac<Sha256>,
    key: Vec<u8>,
}

impl HmacSha256Mac {
    pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
        let inner = Hmac::<Sha256>::new_from_slice(key).map_err(|_| ConfigError::KeyLengthMismatch {
            expected: key.len(),
            actual: key.len(),
        })?;
        Ok(Self {
            inner,
            key: key.to_vec(),
        })
    }
}

impl Mac for HmacSha256Mac {
    fn update(&mut self, data: &[u8]) {
        _RcMacInit::update(&mut self.inner, data);
    }

    fn do_final(&mut self, out: &mut [u8]) -> usize {
        let inner = std::mem::replace(
            &mut self.inner,
            Hmac::<Sha256>::new_from_slice(&self.key).expect("key already validated"),
        );
        let tag = inner.finalize().into_bytes();
        out[..32].copy_from_slice(&tag);
        32
    }

    fn reset(&mut self) {
        self.inner = Hmac::<Sha256>::new_from_slice(&self.key).expect("key already validated");
    }

    fn output_size(&self) -> usize {
        32
    }
}

/// A [`Mac`] implementation backed by `cmac::Cmac<aes::Aes128>`.
///
/// CMAC requires the inner block cipher's block size to be 8 or 16 bytes;
/// AES's is 16, so this always holds for our one bound block cipher family.
pub struct CmacAesMac {
    inner: Cmac<Aes128>,
    key: Vec<u8>,
}

impl CmacAesMac {
    pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
        let inner = <Cmac<Aes128> as _RcCmacInit>::new_from_slice(key).map_err(|_| {
            ConfigError::KeyLengthMismatch {
                expected: 16,
                actual: key.len(),
            }
        })?;
        Ok(Self {
            inner,
            key: key.to_vec(),
        })
    }
}

impl Mac for CmacAesMac {
    fn update(&mut self, data: &[u8]) {
        _RcCmacInit::update(&mut self.inner, data);
    }

    fn do_final(&mut self, out: &mut [u8]) -> usize {
        let inner = std::mem::replace(
            &mut self.inner,
            <Cmac<Aes128> as _RcCmacInit>::new_from_slice(&self.key).expect("key already validated"),
        );
        let tag = inner.finalize().into_bytes();
        out[..16].copy_from_slice(&tag);
        16
    }

    fn reset(&mut self) {
        self.inner =
            <Cmac<Aes128> as _RcCmacInit>::new_from_slice(&self.key).expect("key already validated");
    }

    fn output_size(&self) -> usize {
        16
    }
}

/// Derives `output_len` bytes from `pre_key` using Argon2id, salted with
/// `salt`. Generalized to an arbitrary output length, since callers derive a
/// combined `cipher_key ∥ auth_key` blob whose size varies with the chosen
/// primitives.
pub fn argon2id_derive(pre_key: &[u8], salt: &[u8], output_len: usize) -> Result<Vec<u8>, ConfigError> {
    use argon2::Argon2;

    let mut out = vec![0u8; output_len];
    Argon2::default()
        .hash_password_into(pre_key, salt, &mut out)
        .map_err(|_| ConfigError::KeyLengthMismatch {
            expected: output_len,
            actual: 0,
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_matches_known_vector() {
        let mut hash = Sha256Hash::new();
        hash.update(b"abc");
        let mut out = [0u8; 32];
        hash.do_final(&mut out);
        let expected: [u8; 32] = hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(out, expected);
    }

    #[test]
    fn hmac_reset_retains_key() {
        let mut mac = HmacSha256Mac::new(&[0u8; 32]).unwrap();
        mac.update(b"hello");
        let mut tag1 = [0u8; 32];
        mac.do_final(&mut tag1);

        mac.reset();
        mac.update(b"hello");
        let mut tag2 = [0u8; 32];
        mac.do_final(&mut tag2);

        assert_eq!(tag1, tag2);
    }

    #[test]
    fn cmac_produces_16_byte_tag() {
        let mut mac = CmacAesMac::new(&[0u8; 16]).unwrap();
        mac.update(b"hello world");
        let mut tag = [0u8; 16];
        let n = mac.do_final(&mut tag);
        assert_eq!(n, 16);
    }

    #[test]
    fn argon2id_derive_is_deterministic() {
        let a = argon2id_derive(b"pre-key", b"some-salt-bytes!", 48).unwrap();
        let b = argon2id_derive(b"pre-key", b"some-salt-bytes!", 48).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 48);
    }
}
