// Salsa20 / ChaCha20 / Rabbit raw stream cipher bindings, shared by the
// cipher primitive registry and the schedule CSPRNG.
//
// `chacha20` carries over from this crate's existing dependency set (used
// elsewhere for `XChaCha20`'s nonce type); `salsa20` and `rabbit` are the
// same RustCrypto family, added here to cover the eSTREAM-vector-checked
// Salsa20 cipher and the Rabbit-seeded mux schedule.

use super::StreamCipher as ObscurStreamCipher;

use chacha20::cipher::{KeyIvInit, StreamCipher as RcStreamCipher};
use chacha20::ChaCha20;
use rabbit::Rabbit;
use salsa20::Salsa20;

macro_rules! raw_stream_cipher {
    ($name:ident, $inner:ty, $state_size:expr) => {
        pub struct $name {
            inner: $inner,
            key: Vec<u8>,
            nonce: Vec<u8>,
        }

        impl $name {
            pub fn new(key: &[u8], nonce: &[u8]) -> Self {
                Self {
                    inner: <$inner>::new(key.into(), nonce.into()),
                    key: key.to_vec(),
                    nonce: nonce.to_vec(),
                }
            }
        }

        impl ObscurStreamCipher for $name {
            fn state_size(&self) -> usize {
                $state_size
            }

            fn process_bytes(&mut self, input: &[u8], output: &mut [u8]) {
                output[..input.len()].copy_from_slice(input);
                self.inner
                    .apply_keystream(&mut output[..input.len()]);
            }

            fn reset(&mut self) {
                self.inner = <$inner>::new(self.key.as_slice().into(), self.nonce.as_slice().into());
            }
        }
    };
}

raw_stream_cipher!(Salsa20Stream, Salsa20, 64);
raw_stream_cipher!(ChaCha20Stream, ChaCha20, 64);
raw_stream_cipher!(RabbitStream, Rabbit, 16);

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn salsa20_matches_estream_set1_vector0() {
        // eSTREAM test vector set 1, vector 0: key 0x80 followed by 31 zero
        // bytes, nonce all-zero, keystream applied to an all-zero plaintext.
        let mut key = [0u8; 32];
        key[0] = 0x80;
        let nonce = [0u8; 8];

        let mut cipher = Salsa20Stream::new(&key, &nonce);
        let plaintext = [0u8; 64];
        let mut ciphertext = [0u8; 64];
        cipher.process_bytes(&plaintext, &mut ciphertext);

        let expected = hex!(
            "4DFA5E481DA23EA09A31022050859936"
            "DA52FCEE218005164F267CB65F5CFD7F"
            "2B4F97E0FF16924A52DF269515110A07"
            "F9E460BC65EF95DA58F740B7D1DBB0AA"
        );
        assert_eq!(ciphertext, expected);
    }

    #[test]
    fn stream_cipher_reset_reproduces_same_keystream() {
        let key = [0u8; 32];
        let nonce = [0u8; 12];
        let mut cipher = ChaCha20Stream::new(&key, &nonce);

        let mut first = [0u8; 32];
        cipher.process_bytes(&[0u8; 32], &mut first);

        cipher.reset();
        let mut second = [0u8; 32];
        cipher.process_bytes(&[0u8; 32], &mut second);

        assert_eq!(first, second);
    }

    #[test]
    fn rabbit_keystream_is_deterministic_per_key_and_nonce() {
        let key = [0u8; 16];
        let nonce = [0u8; 8];
        let mut a = RabbitStream::new(&key, &nonce);
        let mut b = RabbitStream::new(&key, &nonce);

        let mut out_a = [0u8; 32];
        let mut out_b = [0u8; 32];
        a.process_bytes(&[0u8; 32], &mut out_a);
        b.process_bytes(&[0u8; 32], &mut out_b);

        assert_eq!(out_a, out_b);
    }
}
