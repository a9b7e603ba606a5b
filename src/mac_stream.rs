// Hash/MAC stream decorator.
//
// Same streaming shape as `crate::cipher_stream::CipherStream` but stateless
// w.r.t. padding: every byte observed is fed straight to the underlying
// digest/MAC, and the finalized tag is read out on `finish()` rather than
// written to the backing stream.

use crate::error::{EndOfStreamError, ObscurCoreError, StateError};
use crate::primitive::Mac;

use std::io::{Read, Write};

pub struct MacStream<RW> {
    inner: RW,
    mac: Box<dyn Mac + Send>,
    writing: bool,
    finished: bool,
    disposed: bool,
    bytes_seen: u64,
    tag: Vec<u8>,
}

impl<RW> MacStream<RW> {
    fn new(inner: RW, mac: Box<dyn Mac + Send>, writing: bool) -> Self {
        Self {
            inner,
            mac,
            writing,
            finished: false,
            disposed: false,
            bytes_seen: 0,
            tag: Vec::new(),
        }
    }

    pub fn new_write(inner: RW, mac: Box<dyn Mac + Send>) -> Self {
        Self::new(inner, mac, true)
    }

    pub fn new_read(inner: RW, mac: Box<dyn Mac + Send>) -> Self {
        Self::new(inner, mac, false)
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    pub fn into_inner(self) -> RW {
        self.inner
    }

    /// The finalized tag, available only after [`Self::finish`].
    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    fn check_live(&self) -> Result<(), ObscurCoreError> {
        if self.disposed {
            return Err(StateError::Disposed.into());
        }
        if self.finished {
            return Err(StateError::FinishedAlready.into());
        }
        Ok(())
    }

    /// Finalizes the MAC, capturing its tag. The backing stream's contents
    /// are preserved across `finish()`; only `reset()` zeroises the tag.
    pub fn finish(&mut self) -> Result<&[u8], ObscurCoreError> {
        self.check_live()?;
        let output_size = self.mac.output_size();
        self.tag = vec![0u8; output_size];
        self.mac.do_final(&mut self.tag);
        self.finished = true;
        Ok(&self.tag)
    }

    pub fn reset(&mut self) {
        self.mac.reset();
        self.tag.iter_mut().for_each(|b| *b = 0);
        self.tag.clear();
        self.bytes_seen = 0;
        self.finished = false;
        self.disposed = false;
    }
}

impl<W: Write> MacStream<W> {
    pub fn write(&mut self, buf: &[u8]) -> Result<(), ObscurCoreError> {
        self.check_live()?;
        if !self.writing {
            return Err(StateError::NotWriting.into());
        }
        self.mac.update(buf);
        self.bytes_seen += buf.len() as u64;
        self.inner.write_all(buf)?;
        Ok(())
    }

    pub fn write_exactly<R: Read>(&mut self, source: &mut R, length: u64) -> Result<(), ObscurCoreError> {
        let mut remaining = length;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let take = remaining.min(chunk.len() as u64) as usize;
            source
                .read_exact(&mut chunk[..take])
                .map_err(|_| EndOfStreamError::Source)?;
            self.write(&chunk[..take])?;
            remaining -= take as u64;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ObscurCoreError> {
        self.check_live()?;
        self.inner.flush()?;
        Ok(())
    }
}

impl<R: Read> MacStream<R> {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ObscurCoreError> {
        self.check_live()?;
        if self.writing {
            return Err(StateError::NotReading.into());
        }
        let n = self.inner.read(buf)?;
        self.mac.update(&buf[..n]);
        self.bytes_seen += n as u64;
        Ok(n)
    }

    pub fn read_exactly<W: Write>(&mut self, sink: &mut W, length: u64) -> Result<(), ObscurCoreError> {
        let mut remaining = length;
        let mut chunk = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let take = remaining.min(chunk.len() as u64) as usize;
            let n = self.read(&mut chunk[..take])?;
            if n == 0 {
                return Err(EndOfStreamError::Binding.into());
            }
            sink.write_all(&chunk[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }
}
