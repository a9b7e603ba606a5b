// obscurcore is a library for building authenticated, confidential packages.
//
// This module defines the error taxonomy shared by every other module:
// each narrow error enum maps onto one failure class from the design
// document, and `ObscurCoreError` composes them the way a caller sees them
// surface from the public API.

use thiserror::Error;

/// A declared configuration is internally inconsistent or unsupported.
///
/// Surfaced eagerly at construction time, never deferred to first use.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// A key's byte length does not match the declared key size.
    #[error("key length {actual} does not match declared key size {expected} bytes")]
    KeyLengthMismatch { expected: usize, actual: usize },
    /// An IV/nonce's byte length is not in the primitive's allowed set.
    #[error("IV/nonce length {actual} is not valid for this primitive (expected {expected} bytes)")]
    IvLengthMismatch { expected: usize, actual: usize },
    /// Padding was declared under a mode that forbids it (CTR/CFB/OFB/stream).
    #[error("padding {0:?} is forbidden under this mode")]
    PaddingForbidden(crate::config::Padding),
    /// No padding was declared under CBC, which requires one.
    #[error("CBC mode requires a padding scheme")]
    PaddingRequired,
    /// `min > max` in a layout scheme's range configuration.
    #[error("range configuration has min {min} > max {max}")]
    InvalidRange { min: i32, max: i32 },
    /// A range configuration violates the scheme's default bounds.
    #[error("range [{min}, {max}] is out of bounds for this layout scheme")]
    RangeOutOfBounds { min: i32, max: i32 },
    /// CMAC was configured over a block cipher whose block size isn't 8 or 16 bytes.
    #[error("CMAC requires a block size of 8 or 16 bytes, got {0}")]
    BadCmacBlockSize(usize),
    /// A Mac/Kdf authentication configuration is missing its mandatory key.
    #[error("authentication configuration of kind {0:?} requires a key at use time")]
    MissingAuthKey(crate::config::AuthFnKind),
    /// An Hmac authentication configuration is missing its inner hash name.
    #[error("HMAC function configuration is missing the inner hash name")]
    MissingHmacInner,
    /// A Cmac authentication configuration is missing its block cipher name.
    #[error("CMAC function configuration is missing the block cipher name")]
    MissingCmacInner,
    /// A `bincode`-encoded entropy or range configuration blob failed to
    /// encode or decode.
    #[error("entropy configuration blob failed to encode/decode")]
    EntropyBlobEncoding,
}

/// The cipher stream or mux is in a state that forbids the requested operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum StateError {
    /// `finish()` has already been called; no further operations are possible.
    #[error("stream has already been finished")]
    FinishedAlready,
    /// The stream has been disposed.
    #[error("stream has been disposed")]
    Disposed,
    /// The stream has not yet been initialized.
    #[error("stream has not been initialized")]
    NotInitialised,
    /// A read was attempted on a stream opened for writing.
    #[error("stream is not open for writing")]
    NotWriting,
    /// A write was attempted on a stream opened for reading.
    #[error("stream is not open for reading")]
    NotReading,
    /// An in-flight concurrent operation was cancelled, leaving the stream unsafe to resume.
    #[error("stream is poisoned by a cancelled concurrent operation; call reset() first")]
    Poisoned,
}

/// A buffer was too short, or a declared length is impossible to satisfy.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DataLengthError {
    /// The output buffer supplied to a cipher primitive was too short.
    #[error("output buffer too short: need {needed}, got {actual}")]
    OutputBufferTooShort { needed: usize, actual: usize },
    /// The declared external length of a payload item could not be reconciled
    /// with the bytes actually available.
    #[error("declared length {declared} is impossible given {available} available bytes")]
    ImpossibleLength { declared: usize, available: usize },
}

/// Padding verification failed on decrypt.
///
/// Deliberately carries no information about *where* verification failed.
/// Indistinguishable in timing and content from [`IntegrityError`] at the
/// point a caller observes it — see [`ObscurCoreError::PackageAuth`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("padding verification failed")]
pub struct BadPaddingError;

/// A payload item's computed MAC did not match its committed external MAC.
///
/// Any plaintext already emitted for this item must be considered tainted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("payload item failed integrity verification")]
pub struct IntegrityError;

/// The mux could not obtain a working key for a payload item.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("no pre-key available for item {0}")]
pub struct ItemKeyMissingError(pub uuid::Uuid);

/// A backing stream was exhausted before a `*_exactly` call could be satisfied.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum EndOfStreamError {
    /// The source stream ran out of bytes while `write_exactly` still owed output.
    #[error("source stream exhausted before the requested length was written")]
    Source,
    /// The sink stream could not accept all requested bytes while `read_exactly` was binding them.
    #[error("sink stream exhausted before the requested length was read")]
    Binding,
}

/// A configuration name did not resolve to a known algorithm.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("\"{0}\" does not name a known algorithm in this category")]
pub struct EnumParseError(pub String);

/// The top-level error type surfaced by the public API.
///
/// The cipher stream and mux never catch and recover internally from any of
/// these: the first error observed poisons the stream (see [`StateError::Poisoned`])
/// and is returned to the caller as-is, with one exception — a primitive's
/// internal "output buffer too short" message is caught at the point it would
/// otherwise leak a primitive-private string, and re-wrapped as
/// [`DataLengthError::OutputBufferTooShort`].
#[derive(Debug, Error)]
pub enum ObscurCoreError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid state: {0}")]
    State(#[from] StateError),
    #[error("data length error: {0}")]
    DataLength(#[from] DataLengthError),
    #[error("{0}")]
    BadPadding(#[from] BadPaddingError),
    #[error("{0}")]
    Integrity(#[from] IntegrityError),
    #[error("missing item key: {0}")]
    ItemKeyMissing(#[from] ItemKeyMissingError),
    #[error("end of stream: {0}")]
    EndOfStream(#[from] EndOfStreamError),
    #[error("enumeration parse error: {0}")]
    EnumParse(#[from] EnumParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObscurCoreError {
    /// Reports whether this error is one of the two that MUST be indistinguishable
    /// to a caller reading a malformed package: bad padding or a failed item MAC.
    ///
    /// Both collapse to the same user-facing class ("package failed authentication")
    /// to avoid leaking which failure occurred.
    pub fn is_package_auth_failure(&self) -> bool {
        matches!(self, Self::BadPadding(_) | Self::Integrity(_))
    }

    /// Returns the user-facing, leakage-free description of this error.
    ///
    /// For [`Self::is_package_auth_failure`] cases this collapses both
    /// padding and integrity failures to one message.
    pub fn user_facing(&self) -> &'static str {
        if self.is_package_auth_failure() {
            "package failed authentication"
        } else {
            "operation failed"
        }
    }
}
