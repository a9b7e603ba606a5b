// Schedule CSPRNG wrapper and the process-wide entropy supplier.
//
// The schedule CSPRNG is deterministic — seeded with a caller-supplied key
// and nonce so write and read sides reproduce an identical decision
// sequence. The entropy supplier is the opposite: a process-wide,
// OS-reseeded source for fresh randomness (key generation, canaries, IVs),
// initialised lazily via `OnceLock` since this crate has no `main()` to call
// an explicit startup routine from.

use crate::config::StreamCipherAlgorithm;
use crate::primitive::{self, StreamCipher};

use std::sync::{Mutex, OnceLock};

use rand::RngCore;

/// A keystream-driven source of schedule decisions: item selection draws and
/// Frameshift/Fabric padding lengths. Deterministic in (key, nonce, algorithm).
pub struct ScheduleCsprng {
    cipher: Box<dyn StreamCipher + Send>,
}

impl ScheduleCsprng {
    pub fn new(algorithm: StreamCipherAlgorithm, key: &[u8], nonce: &[u8]) -> Result<Self, crate::error::ConfigError> {
        let cipher = primitive::make_stream_cipher(algorithm, key, nonce)?;
        Ok(Self { cipher })
    }

    pub fn next_bytes(&mut self, buf: &mut [u8]) {
        self.cipher.get_keystream(buf);
    }

    fn next_u32_raw(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.next_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    /// Draws a uniform integer in `[0, range)` using rejection sampling to
    /// avoid modulo bias: redraw while the sample falls in the final partial
    /// bucket.
    pub fn next_below(&mut self, range: u32) -> u32 {
        assert!(range > 0, "range must be positive");
        let limit = (u32::MAX / range) * range;
        loop {
            let draw = self.next_u32_raw();
            if draw < limit {
                return draw % range;
            }
        }
    }

    /// Draws a uniform integer in `[min, max]` inclusive.
    pub fn next_range(&mut self, min: i32, max: i32) -> i32 {
        debug_assert!(min <= max);
        let span = (max - min) as u32 + 1;
        min + self.next_below(span) as i32
    }
}

/// A pre-materialised entropy tape consumed in the same little-endian `u32`
/// order a live [`ScheduleCsprng`] would produce.
pub struct EntropyTape {
    data: Vec<u8>,
    offset: usize,
}

impl EntropyTape {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    pub fn next_below(&mut self, range: u32) -> Result<u32, crate::error::EndOfStreamError> {
        if self.offset + 4 > self.data.len() {
            return Err(crate::error::EndOfStreamError::Source);
        }
        let draw = u32::from_le_bytes(self.data[self.offset..self.offset + 4].try_into().unwrap());
        self.offset += 4;
        Ok(draw % range)
    }

    pub fn next_range(&mut self, min: i32, max: i32) -> Result<i32, crate::error::EndOfStreamError> {
        let span = (max - min) as u32 + 1;
        Ok(min + self.next_below(span)? as i32)
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset == self.data.len()
    }
}

/// Either a live deterministic CSPRNG or a pre-materialised tape, unified for
/// `crate::mux::PayloadMux`.
pub enum ScheduleEntropy {
    Live(ScheduleCsprng),
    Preallocated(EntropyTape),
}

impl ScheduleEntropy {
    pub fn next_below(&mut self, range: u32) -> Result<u32, crate::error::EndOfStreamError> {
        match self {
            Self::Live(c) => Ok(c.next_below(range)),
            Self::Preallocated(t) => t.next_below(range),
        }
    }

    pub fn next_range(&mut self, min: i32, max: i32) -> Result<i32, crate::error::EndOfStreamError> {
        match self {
            Self::Live(c) => Ok(c.next_range(min, max)),
            Self::Preallocated(t) => t.next_range(min, max),
        }
    }

    pub fn next_bytes(&mut self, buf: &mut [u8]) -> Result<(), crate::error::EndOfStreamError> {
        match self {
            Self::Live(c) => {
                c.next_bytes(buf);
                Ok(())
            }
            Self::Preallocated(t) => {
                if t.offset + buf.len() > t.data.len() {
                    return Err(crate::error::EndOfStreamError::Source);
                }
                buf.copy_from_slice(&t.data[t.offset..t.offset + buf.len()]);
                t.offset += buf.len();
                Ok(())
            }
        }
    }
}

/// Process-wide OS-reseeded CSPRNG, used for fresh key/canary/IV generation.
/// Not used for the mux schedule, which must stay deterministic.
pub struct EntropySupplier {
    rabbit: rabbit::Rabbit,
}

impl EntropySupplier {
    fn seeded() -> Self {
        use chacha20::cipher::KeyIvInit;

        let mut key = [0u8; 16];
        let mut nonce = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        Self {
            rabbit: rabbit::Rabbit::new((&key).into(), (&nonce).into()),
        }
    }

    pub fn next_bytes(&mut self, buf: &mut [u8]) {
        use chacha20::cipher::StreamCipher as _;
        buf.iter_mut().for_each(|b| *b = 0);
        self.rabbit.apply_keystream(buf);
    }

    pub fn next(&mut self, min: i32, max: i32) -> i32 {
        debug_assert!(min <= max);
        let span = (max - min) as u32 + 1;
        let limit = (u32::MAX / span) * span;
        loop {
            let mut raw = [0u8; 4];
            self.next_bytes(&mut raw);
            let draw = u32::from_le_bytes(raw);
            if draw < limit {
                return min + (draw % span) as i32;
            }
        }
    }
}

static ENTROPY_SUPPLIER: OnceLock<Mutex<EntropySupplier>> = OnceLock::new();

/// Returns the process-wide entropy supplier, initialising it from the OS
/// CSPRNG on first use.
pub fn entropy_supplier() -> &'static Mutex<EntropySupplier> {
    ENTROPY_SUPPLIER.get_or_init(|| Mutex::new(EntropySupplier::seeded()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_csprng_is_deterministic_for_same_seed() {
        let mut a = ScheduleCsprng::new(StreamCipherAlgorithm::Rabbit, &[0u8; 16], &[0u8; 8]).unwrap();
        let mut b = ScheduleCsprng::new(StreamCipherAlgorithm::Rabbit, &[0u8; 16], &[0u8; 8]).unwrap();

        for _ in 0..16 {
            assert_eq!(a.next_below(7), b.next_below(7));
        }
    }

    #[test]
    fn next_below_never_returns_out_of_range() {
        let mut c = ScheduleCsprng::new(StreamCipherAlgorithm::Rabbit, &[1u8; 16], &[2u8; 8]).unwrap();
        for _ in 0..256 {
            let v = c.next_below(3);
            assert!(v < 3);
        }
    }

    #[test]
    fn entropy_tape_reproduces_live_csprng_decisions() {
        let mut live = ScheduleCsprng::new(StreamCipherAlgorithm::Rabbit, &[3u8; 16], &[4u8; 8]).unwrap();
        let mut tape_data = vec![0u8; 4 * 4];
        live.next_bytes(&mut tape_data);

        let mut replay = ScheduleCsprng::new(StreamCipherAlgorithm::Rabbit, &[3u8; 16], &[4u8; 8]).unwrap();
        let mut replay_tape = vec![0u8; 4 * 4];
        replay.next_bytes(&mut replay_tape);

        assert_eq!(tape_data, replay_tape);
    }

    #[test]
    fn entropy_supplier_singleton_is_reachable() {
        let supplier = entropy_supplier();
        let mut guard = supplier.lock().unwrap();
        let mut buf = [0u8; 16];
        guard.next_bytes(&mut buf);
        assert_ne!(buf, [0u8; 16]);
    }
}
