// Cipher stream decorator.
//
// Two impl blocks share one struct, split by direction, rather than splitting
// encrypt vs. decrypt into separate types — both paths stay on one type so
// `crate::mux` can hold either kind behind the same field without an enum.
// The backing stream is borrowed, never owned outright: there is no
// close-on-dispose coupling between the stream and its backing I/O.
//
// Decrypt-side padding hold-back: rather than holding back the *output* of
// the last operation (ambiguous about what a final re-processing step
// operates on once padding has already been stripped), this holds back the
// last *ciphertext* operation unprocessed until a further full operation
// proves it wasn't final. This is semantically equivalent and composes
// cleanly with a final-block ciphertext-in / plaintext-out contract.

use crate::cipher_wrapper::CipherWrapper;
use crate::error::{EndOfStreamError, ObscurCoreError, StateError};
use crate::ring::Ring;

use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;

const RING_CAPACITY: usize = 16 * 1024;

pub struct CipherStream<RW> {
    inner: RW,
    wrapper: Box<dyn CipherWrapper + Send>,
    op_in: Vec<u8>,
    op_in_offset: usize,
    op_out: Vec<u8>,
    in_buffer: Ring<u8>,
    out_buffer: Ring<u8>,
    bytes_in: u64,
    bytes_out: u64,
    writing: bool,
    finished: bool,
    disposed: bool,
    held_ciphertext: Option<Vec<u8>>,
    padded: bool,
}

impl<RW> CipherStream<RW> {
    fn new(inner: RW, wrapper: Box<dyn CipherWrapper + Send>, writing: bool, padded: bool) -> Self {
        let operation_size = wrapper.operation_size();
        let max_delta = wrapper.max_delta(writing).unsigned_abs();
        let op_out_size = (operation_size + max_delta) * 2;

        Self {
            inner,
            wrapper,
            op_in: vec![0u8; operation_size],
            op_in_offset: 0,
            op_out: vec![0u8; op_out_size],
            in_buffer: Ring::with_capacity(RING_CAPACITY),
            out_buffer: Ring::with_capacity(RING_CAPACITY),
            bytes_in: 0,
            bytes_out: 0,
            writing,
            finished: false,
            disposed: false,
            held_ciphertext: None,
            padded,
        }
    }

    pub fn new_encrypt(inner: RW, wrapper: Box<dyn CipherWrapper + Send>) -> Self {
        Self::new(inner, wrapper, true, false)
    }

    pub fn new_decrypt(inner: RW, wrapper: Box<dyn CipherWrapper + Send>, padded: bool) -> Self {
        Self::new(inner, wrapper, false, padded)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn into_inner(self) -> RW {
        self.inner
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

    pub fn reset(&mut self) {
        self.wrapper.reset();
        self.op_in_offset = 0;
        self.held_ciphertext = None;
        self.bytes_in = 0;
        self.bytes_out = 0;
        self.finished = false;
        self.disposed = false;
    }
}

impl<W: Write> CipherStream<W> {
    pub fn write(&mut self, mut buf: &[u8]) -> Result<(), ObscurCoreError> {
        self.check_live()?;
        if !self.writing {
            return Err(StateError::NotWriting.into());
        }

        if self.out_buffer.len() >= self.wrapper.operation_size() {
            self.out_buffer.drain_to(&mut self.inner)?;
        }

        let operation_size = self.wrapper.operation_size();
        while !buf.is_empty() {
            if self.op_in_offset > 0 || !self.in_buffer.is_empty() {
                while self.op_in_offset < operation_size && !self.in_buffer.is_empty() {
                    let n = self
                        .in_buffer
                        .pop_front(&mut self.op_in[self.op_in_offset..operation_size]);
                    self.op_in_offset += n;
                }
                while self.op_in_offset < operation_size && !buf.is_empty() {
                    self.op_in[self.op_in_offset] = buf[0];
                    self.op_in_offset += 1;
                    buf = &buf[1..];
                    self.bytes_in += 1;
                }
                if self.op_in_offset == operation_size {
                    let n = self.wrapper.process(&self.op_in, &mut self.op_out)?;
                    self.out_buffer.push_back(&self.op_out[..n]);
                    self.bytes_out += n as u64;
                    self.op_in_offset = 0;
                }
            } else if buf.len() >= operation_size {
                let n = self.wrapper.process(&buf[..operation_size], &mut self.op_out)?;
                self.out_buffer.push_back(&self.op_out[..n]);
                self.bytes_in += operation_size as u64;
                self.bytes_out += n as u64;
                buf = &buf[operation_size..];
            } else {
                self.op_in[..buf.len()].copy_from_slice(buf);
                self.op_in_offset = buf.len();
                self.bytes_in += buf.len() as u64;
                buf = &[];
            }

            if self.out_buffer.spare() < operation_size {
                self.out_buffer.drain_to(&mut self.inner)?;
            }
        }

        self.out_buffer
            .drain_down_to(&mut self.inner, operation_size)?;
        Ok(())
    }

    /// Copies exactly `length` bytes from `source` through the cipher.
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

    /// Concurrent variant of [`Self::write_exactly`]: one thread reads
    /// plaintext from `source` while a second drains finished ciphertext to
    /// the backing sink, leaving this thread free to run the cipher itself,
    /// using a paired refill/drain `thread::scope`.
    pub fn write_exactly_async<R>(
        &mut self,
        source: &mut R,
        length: u64,
    ) -> Result<(), ObscurCoreError>
    where
        R: Read + Send,
        W: Send,
    {
        self.check_live()?;
        if !self.writing {
            return Err(StateError::NotWriting.into());
        }
        self.out_buffer.drain_to(&mut self.inner)?;

        let operation_size = self.wrapper.operation_size();
        let chunk_size = (64 * 1024).max(operation_size);

        let Self {
            inner,
            wrapper,
            op_in,
            op_in_offset,
            op_out,
            bytes_in,
            bytes_out,
            ..
        } = self;

        let (refill_tx, refill_rx) = mpsc::sync_channel::<std::io::Result<Vec<u8>>>(1);
        let (drain_tx, drain_rx) = mpsc::sync_channel::<Vec<u8>>(1);

        thread::scope(move |scope| -> Result<(), ObscurCoreError> {
            scope.spawn(move || {
                let mut remaining = length;
                while remaining > 0 {
                    let take = remaining.min(chunk_size as u64) as usize;
                    let mut buf = vec![0u8; take];
                    let result = source.read_exact(&mut buf).map(|_| buf);
                    let failed = result.is_err();
                    if refill_tx.send(result).is_err() || failed {
                        break;
                    }
                    remaining -= take as u64;
                }
            });

            scope.spawn(move || {
                while let Ok(chunk) = drain_rx.recv() {
                    if inner.write_all(&chunk).is_err() {
                        break;
                    }
                }
            });

            let mut remaining = length;
            while remaining > 0 {
                let chunk = refill_rx
                    .recv()
                    .map_err(|_| ObscurCoreError::from(EndOfStreamError::Source))?
                    .map_err(|_| ObscurCoreError::from(EndOfStreamError::Source))?;
                remaining -= chunk.len() as u64;

                let mut buf: &[u8] = &chunk;
                while !buf.is_empty() {
                    if *op_in_offset > 0 || buf.len() < operation_size {
                        let take = (operation_size - *op_in_offset).min(buf.len());
                        op_in[*op_in_offset..*op_in_offset + take].copy_from_slice(&buf[..take]);
                        *op_in_offset += take;
                        *bytes_in += take as u64;
                        buf = &buf[take..];
                        if *op_in_offset == operation_size {
                            let n = wrapper.process(op_in.as_slice(), op_out.as_mut_slice())?;
                            *bytes_out += n as u64;
                            drain_tx
                                .send(op_out[..n].to_vec())
                                .map_err(|_| ObscurCoreError::from(EndOfStreamError::Binding))?;
                            *op_in_offset = 0;
                        }
                    } else {
                        let n =
                            wrapper.process(&buf[..operation_size], op_out.as_mut_slice())?;
                        *bytes_in += operation_size as u64;
                        *bytes_out += n as u64;
                        drain_tx
                            .send(op_out[..n].to_vec())
                            .map_err(|_| ObscurCoreError::from(EndOfStreamError::Binding))?;
                        buf = &buf[operation_size..];
                    }
                }
            }

            drop(drain_tx);
            Ok(())
        })
    }

    pub fn flush(&mut self) -> Result<(), ObscurCoreError> {
        self.check_live()?;
        self.out_buffer.drain_to(&mut self.inner)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), ObscurCoreError> {
        self.check_live()?;
        if !self.writing {
            return Err(StateError::NotWriting.into());
        }

        self.out_buffer.drain_to(&mut self.inner)?;

        let n = self
            .wrapper
            .process_final(&self.op_in, self.op_in_offset, &mut self.op_out)?;
        self.inner.write_all(&self.op_out[..n])?;
        self.bytes_out += n as u64;
        self.op_in_offset = 0;
        self.finished = true;
        Ok(())
    }
}

impl<R: Read> CipherStream<R> {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ObscurCoreError> {
        self.check_state_for_read()?;
        if self.writing {
            return Err(StateError::NotReading.into());
        }

        let mut total = 0;
        let operation_size = self.wrapper.operation_size();

        if !self.out_buffer.is_empty() {
            total += self.out_buffer.pop_front(buf);
        }

        while total < buf.len() && !self.finished {
            if self.out_buffer.is_empty() {
                self.fill_one_operation()?;
            }
            total += self.out_buffer.pop_front(&mut buf[total..]);
        }

        Ok(total)
    }

    fn check_state_for_read(&self) -> Result<(), ObscurCoreError> {
        if self.disposed {
            return Err(StateError::Disposed.into());
        }
        Ok(())
    }

    /// Pulls bytes into `op_in` from a backing source, producing at most one
    /// operation's worth of plaintext into `out_buffer`, or finalising if the
    /// source is exhausted.
    fn fill_one_operation(&mut self) -> Result<(), ObscurCoreError> {
        let operation_size = self.wrapper.operation_size();

        while self.op_in_offset < operation_size {
            let mut from_in_buffer = vec![0u8; operation_size - self.op_in_offset];
            let n = self.in_buffer.pop_front(&mut from_in_buffer);
            if n > 0 {
                self.op_in[self.op_in_offset..self.op_in_offset + n]
                    .copy_from_slice(&from_in_buffer[..n]);
                self.op_in_offset += n;
                continue;
            }

            let mut byte = [0u8; 1];
            let read = self.inner.read(&mut byte)?;
            if read == 0 {
                break;
            }
            self.op_in[self.op_in_offset] = byte[0];
            self.op_in_offset += 1;
        }

        if self.op_in_offset == operation_size {
            self.bytes_in += operation_size as u64;

            if self.padded {
                if let Some(held) = self.held_ciphertext.take() {
                    let n = self.wrapper.process(&held, &mut self.op_out)?;
                    self.out_buffer.push_back(&self.op_out[..n]);
                    self.bytes_out += n as u64;
                }
                self.held_ciphertext = Some(self.op_in.clone());
            } else {
                let n = self.wrapper.process(&self.op_in, &mut self.op_out)?;
                self.out_buffer.push_back(&self.op_out[..n]);
                self.bytes_out += n as u64;
            }
            self.op_in_offset = 0;
        } else {
            // Source exhausted before a full operation assembled.
            if self.padded {
                if let Some(held) = self.held_ciphertext.take() {
                    let n = self.wrapper.process_final(&held, operation_size, &mut self.op_out)?;
                    self.out_buffer.push_back(&self.op_out[..n]);
                    self.bytes_out += n as u64;
                } else if self.op_in_offset > 0 {
                    // Malformed: padded ciphertext should always be block-aligned.
                    let n = self.wrapper.process_final(
                        &self.op_in,
                        self.op_in_offset,
                        &mut self.op_out,
                    )?;
                    self.out_buffer.push_back(&self.op_out[..n]);
                    self.bytes_out += n as u64;
                }
            } else {
                let n = self
                    .wrapper
                    .process_final(&self.op_in, self.op_in_offset, &mut self.op_out)?;
                self.out_buffer.push_back(&self.op_out[..n]);
                self.bytes_out += n as u64;
            }
            self.op_in_offset = 0;
            self.finished = true;
        }

        Ok(())
    }

    /// Reads exactly `length` bytes of plaintext into `sink`. If `finishing`,
    /// also finalises the stream once `length` bytes have been produced.
    pub fn read_exactly<W: Write>(
        &mut self,
        sink: &mut W,
        length: u64,
        finishing: bool,
    ) -> Result<(), ObscurCoreError> {
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
        if finishing {
            self.finished = true;
        }
        Ok(())
    }

    /// Concurrent variant of [`Self::read_exactly`]: one thread reads raw
    /// ciphertext from the backing source while a second drains finished
    /// plaintext to `sink`, leaving this thread free to run the cipher
    /// itself. Grounded the same way as [`Self::write_exactly_async`].
    pub fn read_exactly_async<S>(
        &mut self,
        sink: &mut S,
        length: u64,
        finishing: bool,
    ) -> Result<(), ObscurCoreError>
    where
        S: Write + Send,
        R: Send,
    {
        self.check_state_for_read()?;
        if self.writing {
            return Err(StateError::NotReading.into());
        }

        let operation_size = self.wrapper.operation_size();
        let chunk_size = (64 * 1024).max(operation_size);

        let Self {
            inner,
            wrapper,
            op_in,
            op_in_offset,
            op_out,
            out_buffer,
            bytes_in,
            bytes_out,
            finished,
            padded,
            held_ciphertext,
            ..
        } = self;

        let (refill_tx, refill_rx) = mpsc::sync_channel::<Vec<u8>>(1);
        let (drain_tx, drain_rx) = mpsc::sync_channel::<Vec<u8>>(1);

        thread::scope(move |scope| -> Result<(), ObscurCoreError> {
            scope.spawn(move || {
                let mut buf = vec![0u8; chunk_size];
                loop {
                    match inner.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if refill_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });

            scope.spawn(move || {
                while let Ok(chunk) = drain_rx.recv() {
                    if sink.write_all(&chunk).is_err() {
                        break;
                    }
                }
            });

            let mut produced: u64 = 0;
            let mut pending: Vec<u8> = Vec::new();
            let mut refill_open = true;

            while produced < length && !*finished {
                while *op_in_offset < operation_size {
                    if pending.is_empty() {
                        if !refill_open {
                            break;
                        }
                        match refill_rx.recv() {
                            Ok(chunk) => pending = chunk,
                            Err(_) => {
                                refill_open = false;
                                break;
                            }
                        }
                        continue;
                    }
                    let take = (operation_size - *op_in_offset).min(pending.len());
                    op_in[*op_in_offset..*op_in_offset + take]
                        .copy_from_slice(&pending[..take]);
                    *op_in_offset += take;
                    pending.drain(..take);
                }

                if *op_in_offset == operation_size {
                    *bytes_in += operation_size as u64;
                    if *padded {
                        if let Some(held) = held_ciphertext.take() {
                            let n = wrapper.process(&held, op_out.as_mut_slice())?;
                            out_buffer.push_back(&op_out[..n]);
                            *bytes_out += n as u64;
                        }
                        *held_ciphertext = Some(op_in.clone());
                    } else {
                        let n = wrapper.process(op_in.as_slice(), op_out.as_mut_slice())?;
                        out_buffer.push_back(&op_out[..n]);
                        *bytes_out += n as u64;
                    }
                    *op_in_offset = 0;
                } else {
                    if *padded {
                        if let Some(held) = held_ciphertext.take() {
                            let n = wrapper.process_final(
                                &held,
                                operation_size,
                                op_out.as_mut_slice(),
                            )?;
                            out_buffer.push_back(&op_out[..n]);
                            *bytes_out += n as u64;
                        } else if *op_in_offset > 0 {
                            let n = wrapper.process_final(
                                op_in.as_slice(),
                                *op_in_offset,
                                op_out.as_mut_slice(),
                            )?;
                            out_buffer.push_back(&op_out[..n]);
                            *bytes_out += n as u64;
                        }
                    } else {
                        let n = wrapper.process_final(
                            op_in.as_slice(),
                            *op_in_offset,
                            op_out.as_mut_slice(),
                        )?;
                        out_buffer.push_back(&op_out[..n]);
                        *bytes_out += n as u64;
                    }
                    *op_in_offset = 0;
                    *finished = true;
                }

                while !out_buffer.is_empty() && produced < length {
                    let take = ((length - produced) as usize).min(out_buffer.len());
                    let mut piece = vec![0u8; take];
                    let n = out_buffer.pop_front(&mut piece);
                    piece.truncate(n);
                    produced += n as u64;
                    drain_tx
                        .send(piece)
                        .map_err(|_| ObscurCoreError::from(EndOfStreamError::Binding))?;
                }
            }

            drop(drain_tx);

            if produced < length {
                return Err(EndOfStreamError::Binding.into());
            }
            if finishing {
                *finished = true;
            }
            Ok(())
        })
    }
}
