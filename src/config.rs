// Configuration types for the cipher, authentication and payload layers.
//
// Plain `serde`-derived structs with a constructor that validates
// cross-field invariants eagerly, and case-insensitive string parsing for
// every named-algorithm enum.

use crate::error::ConfigError;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! case_insensitive_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = crate::error::EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.eq_ignore_ascii_case(stringify!($variant)) {
                    return Ok(Self::$variant);
                })+
                Err(crate::error::EnumParseError(s.to_string()))
            }
        }
    };
}

case_insensitive_enum! {
    /// Which family a [`CipherConfiguration`] belongs to.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum CipherKind { None, Block, Stream }
}

case_insensitive_enum! {
    /// Block cipher mode of operation.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum BlockMode { Cbc, Cfb, Ctr, Ofb }
}

case_insensitive_enum! {
    /// Block padding scheme.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum Padding { None, Iso10126D2, Iso7816D4, Pkcs7, Tbc, X923 }
}

case_insensitive_enum! {
    /// Payload multiplexer layout scheme.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum LayoutScheme { Simple, Frameshift, Fabric }
}

case_insensitive_enum! {
    /// Which family an [`AuthenticationConfiguration`] belongs to.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum AuthFnKind { None, Hash, Mac, Kdf }
}

case_insensitive_enum! {
    /// Where the mux draws its schedule/padding entropy from.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum MuxEntropyScheme { StreamCipherCsprng, Preallocation }
}

case_insensitive_enum! {
    /// Concrete block cipher algorithm.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum BlockCipherAlgorithm { Aes128, Aes192, Aes256 }
}

case_insensitive_enum! {
    /// Concrete raw stream cipher algorithm.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum StreamCipherAlgorithm { Salsa20, ChaCha20, Rabbit }
}

case_insensitive_enum! {
    /// Concrete hash algorithm.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum HashAlgorithm { Sha256 }
}

case_insensitive_enum! {
    /// Concrete MAC algorithm.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum MacAlgorithm { HmacSha256, CmacAes }
}

case_insensitive_enum! {
    /// Concrete KDF algorithm.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
    pub enum KdfAlgorithm { Argon2id }
}

impl BlockCipherAlgorithm {
    pub fn key_size(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    pub fn block_size(self) -> usize {
        16
    }
}

impl StreamCipherAlgorithm {
    pub fn key_size(self) -> usize {
        match self {
            Self::Salsa20 => 32,
            Self::ChaCha20 => 32,
            Self::Rabbit => 16,
        }
    }

    pub fn nonce_size(self) -> usize {
        match self {
            Self::Salsa20 => 8,
            Self::ChaCha20 => 12,
            Self::Rabbit => 8,
        }
    }

    /// Native internal state size in bytes, used to derive the cipher
    /// wrapper's operation size (`state_size << STRIDE_INCREASE_FACTOR`).
    pub fn state_size(self) -> usize {
        match self {
            Self::Salsa20 => 64,
            Self::ChaCha20 => 64,
            Self::Rabbit => 16,
        }
    }
}

impl HashAlgorithm {
    pub fn output_size(self) -> usize {
        match self {
            Self::Sha256 => 32,
        }
    }
}

impl MacAlgorithm {
    pub fn output_size(self) -> usize {
        match self {
            Self::HmacSha256 => 32,
            Self::CmacAes => 16,
        }
    }
}

/// Tagged description of a (block or stream) cipher and, if block, its mode
/// and padding.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CipherConfiguration {
    pub kind: CipherKind,
    pub block_algorithm: Option<BlockCipherAlgorithm>,
    pub stream_algorithm: Option<StreamCipherAlgorithm>,
    pub mode: Option<BlockMode>,
    pub padding: Padding,
    pub key_size_bits: usize,
    pub iv_size_bytes: usize,
}

impl CipherConfiguration {
    /// Builds and validates a block cipher configuration.
    pub fn block(
        algorithm: BlockCipherAlgorithm,
        mode: BlockMode,
        padding: Padding,
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

        Ok(Self {
            kind: CipherKind::Block,
            block_algorithm: Some(algorithm),
            stream_algorithm: None,
            mode: Some(mode),
            padding,
            key_size_bits: algorithm.key_size() * 8,
            iv_size_bytes: algorithm.block_size(),
        })
    }

    /// Builds a raw stream cipher configuration. Padding is always forbidden.
    pub fn stream(algorithm: StreamCipherAlgorithm) -> Self {
        Self {
            kind: CipherKind::Stream,
            block_algorithm: None,
            stream_algorithm: Some(algorithm),
            mode: None,
            padding: Padding::None,
            key_size_bits: algorithm.key_size() * 8,
            iv_size_bytes: algorithm.nonce_size(),
        }
    }

    /// Validates a candidate key against this configuration's declared size.
    pub fn validate_key(&self, key: &[u8]) -> Result<(), ConfigError> {
        let expected = self.key_size_bits / 8;
        if key.len() != expected {
            return Err(ConfigError::KeyLengthMismatch {
                expected,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Validates a candidate IV/nonce against this configuration's declared size.
    pub fn validate_iv(&self, iv: &[u8]) -> Result<(), ConfigError> {
        if iv.len() != self.iv_size_bytes {
            return Err(ConfigError::IvLengthMismatch {
                expected: self.iv_size_bytes,
                actual: iv.len(),
            });
        }
        Ok(())
    }
}

/// Function-specific configuration carried by an [`AuthenticationConfiguration`].
///
/// For HMAC this names the inner hash; for CMAC the inner block cipher.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FunctionConfiguration {
    Hmac { inner_hash: HashAlgorithm },
    Cmac { block_cipher: BlockCipherAlgorithm },
    Kdf { algorithm: KdfAlgorithm, salt: Vec<u8> },
    None,
}

/// Tagged description of a hash, MAC or KDF function.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationConfiguration {
    pub kind: AuthFnKind,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub mac_algorithm: Option<MacAlgorithm>,
    pub key_size_bits: Option<usize>,
    pub nonce: Option<Vec<u8>>,
    pub salt: Option<Vec<u8>>,
    pub additional_data: Option<Vec<u8>>,
    pub output_size_bytes: Option<usize>,
    pub function_configuration: FunctionConfiguration,
}

impl AuthenticationConfiguration {
    /// Builds an HMAC-SHA256 configuration, the mux's default Encrypt-then-MAC function.
    pub fn hmac_sha256() -> Self {
        Self {
            kind: AuthFnKind::Mac,
            hash_algorithm: None,
            mac_algorithm: Some(MacAlgorithm::HmacSha256),
            key_size_bits: Some(256),
            nonce: None,
            salt: None,
            additional_data: None,
            output_size_bytes: Some(32),
            function_configuration: FunctionConfiguration::Hmac {
                inner_hash: HashAlgorithm::Sha256,
            },
        }
    }

    /// Builds a CMAC-AES128 configuration.
    pub fn cmac_aes128() -> Result<Self, ConfigError> {
        let cipher = BlockCipherAlgorithm::Aes128;
        if ![8usize, 16].contains(&cipher.block_size()) {
            return Err(ConfigError::BadCmacBlockSize(cipher.block_size()));
        }
        Ok(Self {
            kind: AuthFnKind::Mac,
            hash_algorithm: None,
            mac_algorithm: Some(MacAlgorithm::CmacAes),
            key_size_bits: Some(cipher.key_size() * 8),
            nonce: None,
            salt: None,
            additional_data: None,
            output_size_bytes: Some(16),
            function_configuration: FunctionConfiguration::Cmac {
                block_cipher: cipher,
            },
        })
    }

    /// Builds an Argon2id KDF configuration.
    pub fn argon2id(salt: Vec<u8>, output_size_bytes: usize) -> Self {
        Self {
            kind: AuthFnKind::Kdf,
            hash_algorithm: None,
            mac_algorithm: None,
            key_size_bits: None,
            nonce: None,
            salt: Some(salt.clone()),
            additional_data: None,
            output_size_bytes: Some(output_size_bytes),
            function_configuration: FunctionConfiguration::Kdf {
                algorithm: KdfAlgorithm::Argon2id,
                salt,
            },
        }
    }

    /// Validates that a Mac/Kdf configuration carries everything it needs at use time.
    pub fn validate_for_use(&self) -> Result<(), ConfigError> {
        match self.kind {
            AuthFnKind::Mac | AuthFnKind::Kdf => {
                if self.key_size_bits.is_none() {
                    return Err(ConfigError::MissingAuthKey(self.kind));
                }
            }
            _ => {}
        }

        match &self.function_configuration {
            FunctionConfiguration::Hmac { .. } => {}
            FunctionConfiguration::Cmac { .. } => {}
            FunctionConfiguration::Kdf { .. } => {}
            FunctionConfiguration::None => {
                if matches!(self.mac_algorithm, Some(MacAlgorithm::HmacSha256)) {
                    return Err(ConfigError::MissingHmacInner);
                }
                if matches!(self.mac_algorithm, Some(MacAlgorithm::CmacAes)) {
                    return Err(ConfigError::MissingCmacInner);
                }
            }
        }

        Ok(())
    }

    /// Structural equality explicit about `function_configuration` and
    /// treating an absent byte blob the same as an empty one, so a `None`
    /// salt and an empty-`Vec` salt compare equal.
    pub fn configuration_eq(&self, other: &Self) -> bool {
        let blob_eq = |a: &Option<Vec<u8>>, b: &Option<Vec<u8>>| {
            a.as_deref().unwrap_or(&[]) == b.as_deref().unwrap_or(&[])
        };

        self.kind == other.kind
            && self.hash_algorithm == other.hash_algorithm
            && self.mac_algorithm == other.mac_algorithm
            && self.key_size_bits == other.key_size_bits
            && blob_eq(&self.nonce, &other.nonce)
            && blob_eq(&self.salt, &other.salt)
            && blob_eq(&self.additional_data, &other.additional_data)
            && self.output_size_bytes == other.output_size_bytes
            && self.function_configuration == other.function_configuration
    }
}

/// `{min, max}` bounds for Frameshift padding lengths or Fabric stripe lengths.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeConfiguration {
    pub min: i32,
    pub max: i32,
}

impl RangeConfiguration {
    pub const FRAMESHIFT_MIN_FLOOR: i32 = 2;
    pub const FRAMESHIFT_MAX_CEIL: i32 = 512;
    pub const FABRIC_MIN_FLOOR: i32 = 16;
    pub const FABRIC_MAX_CEIL: i32 = 32768;

    fn new_checked(min: i32, max: i32, floor: i32, ceil: i32) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidRange { min, max });
        }
        if min < floor || max > ceil {
            return Err(ConfigError::RangeOutOfBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn frameshift(min: i32, max: i32) -> Result<Self, ConfigError> {
        Self::new_checked(
            min,
            max,
            Self::FRAMESHIFT_MIN_FLOOR,
            Self::FRAMESHIFT_MAX_CEIL,
        )
    }

    pub fn fabric(min: i32, max: i32) -> Result<Self, ConfigError> {
        Self::new_checked(min, max, Self::FABRIC_MIN_FLOOR, Self::FABRIC_MAX_CEIL)
    }

    /// Encodes `{min, max}` as a compact binary blob via `bincode`.
    pub fn to_bincode(&self) -> Result<Vec<u8>, ConfigError> {
        bincode::serialize(self).map_err(|_| ConfigError::EntropyBlobEncoding)
    }

    /// Decodes a range configuration blob produced by [`Self::to_bincode`].
    /// Bounds are re-validated against the scheme floor/ceil the caller
    /// supplies, since the wire format alone doesn't say which scheme this
    /// range belongs to.
    pub fn from_bincode(bytes: &[u8], floor: i32, ceil: i32) -> Result<Self, ConfigError> {
        let decoded: Self =
            bincode::deserialize(bytes).map_err(|_| ConfigError::EntropyBlobEncoding)?;
        Self::new_checked(decoded.min, decoded.max, floor, ceil)
    }
}

/// Seed material for the schedule CSPRNG, or a pre-materialised entropy tape.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EntropySchemeData {
    StreamCipherCsprng {
        algorithm: StreamCipherAlgorithm,
        key: Vec<u8>,
        nonce: Vec<u8>,
    },
    Preallocation(Vec<u8>),
}

impl EntropySchemeData {
    /// Encodes this entropy configuration as a compact binary blob via
    /// `bincode`, the same wire encoding used elsewhere in this crate for
    /// configuration payloads.
    pub fn to_bincode(&self) -> Result<Vec<u8>, ConfigError> {
        bincode::serialize(self).map_err(|_| ConfigError::EntropyBlobEncoding)
    }

    /// Decodes an entropy configuration blob produced by [`Self::to_bincode`].
    pub fn from_bincode(bytes: &[u8]) -> Result<Self, ConfigError> {
        bincode::deserialize(bytes).map_err(|_| ConfigError::EntropyBlobEncoding)
    }
}

/// Describes how the mux lays items out in the package stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PayloadConfiguration {
    pub scheme: LayoutScheme,
    pub scheme_range: Option<RangeConfiguration>,
    pub entropy_scheme: MuxEntropyScheme,
    pub entropy_scheme_data: EntropySchemeData,
}

impl PayloadConfiguration {
    pub fn simple(entropy_scheme_data: EntropySchemeData) -> Self {
        Self {
            scheme: LayoutScheme::Simple,
            scheme_range: None,
            entropy_scheme: match &entropy_scheme_data {
                EntropySchemeData::StreamCipherCsprng { .. } => MuxEntropyScheme::StreamCipherCsprng,
                EntropySchemeData::Preallocation(_) => MuxEntropyScheme::Preallocation,
            },
            entropy_scheme_data,
        }
    }

    pub fn frameshift(
        range: RangeConfiguration,
        entropy_scheme_data: EntropySchemeData,
    ) -> Self {
        Self {
            scheme: LayoutScheme::Frameshift,
            scheme_range: Some(range),
            entropy_scheme: match &entropy_scheme_data {
                EntropySchemeData::StreamCipherCsprng { .. } => MuxEntropyScheme::StreamCipherCsprng,
                EntropySchemeData::Preallocation(_) => MuxEntropyScheme::Preallocation,
            },
            entropy_scheme_data,
        }
    }

    pub fn fabric(range: RangeConfiguration, entropy_scheme_data: EntropySchemeData) -> Self {
        Self {
            scheme: LayoutScheme::Fabric,
            scheme_range: Some(range),
            entropy_scheme: match &entropy_scheme_data {
                EntropySchemeData::StreamCipherCsprng { .. } => MuxEntropyScheme::StreamCipherCsprng,
                EntropySchemeData::Preallocation(_) => MuxEntropyScheme::Preallocation,
            },
            entropy_scheme_data,
        }
    }
}

/// One item bundled into a package: identifier, cipher/auth configuration and
/// committed length.
///
/// `iv` holds the concrete IV/nonce the mux needs to construct this item's
/// cipher wrapper. A manifest-level orchestrator outside this crate's scope
/// would normally own IV assignment, but since that orchestrator doesn't
/// exist here, the item itself carries it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayloadItem {
    pub id: Uuid,
    pub path: String,
    /// Length of ciphertext + MAC tag, as committed when the package was built.
    pub external_length: u64,
    pub cipher_configuration: CipherConfiguration,
    pub auth_configuration: AuthenticationConfiguration,
    pub iv: Vec<u8>,
    pub pre_key: Option<Vec<u8>>,
    pub cipher_key: Option<Vec<u8>>,
    pub auth_key: Option<Vec<u8>>,
    pub kdf_configuration: Option<AuthenticationConfiguration>,
}

impl PayloadItem {
    pub fn new(
        path: String,
        cipher_configuration: CipherConfiguration,
        auth_configuration: AuthenticationConfiguration,
        iv: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        cipher_configuration.validate_iv(&iv)?;
        Ok(Self {
            id: Uuid::new_v4(),
            path,
            external_length: 0,
            cipher_configuration,
            auth_configuration,
            iv,
            pre_key: None,
            cipher_key: None,
            auth_key: None,
            kdf_configuration: None,
        })
    }

    pub fn with_pre_key(mut self, pre_key: Vec<u8>, kdf_configuration: AuthenticationConfiguration) -> Self {
        self.pre_key = Some(pre_key);
        self.kdf_configuration = Some(kdf_configuration);
        self
    }

    pub fn with_explicit_keys(mut self, cipher_key: Vec<u8>, auth_key: Vec<u8>) -> Self {
        self.cipher_key = Some(cipher_key);
        self.auth_key = Some(auth_key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_parsing_is_case_insensitive() {
        assert_eq!("cbc".parse::<BlockMode>().unwrap(), BlockMode::Cbc);
        assert_eq!("CBC".parse::<BlockMode>().unwrap(), BlockMode::Cbc);
        assert_eq!("CfB".parse::<BlockMode>().unwrap(), BlockMode::Cfb);
        assert!("not-a-mode".parse::<BlockMode>().is_err());
    }

    #[test]
    fn cbc_requires_padding() {
        assert!(matches!(
            CipherConfiguration::block(BlockCipherAlgorithm::Aes128, BlockMode::Cbc, Padding::None),
            Err(ConfigError::PaddingRequired)
        ));
        assert!(CipherConfiguration::block(
            BlockCipherAlgorithm::Aes128,
            BlockMode::Cbc,
            Padding::Pkcs7
        )
        .is_ok());
    }

    #[test]
    fn ctr_forbids_padding() {
        assert!(matches!(
            CipherConfiguration::block(BlockCipherAlgorithm::Aes128, BlockMode::Ctr, Padding::Pkcs7),
            Err(ConfigError::PaddingForbidden(Padding::Pkcs7))
        ));
    }

    #[test]
    fn key_length_validation() {
        let cfg =
            CipherConfiguration::block(BlockCipherAlgorithm::Aes128, BlockMode::Ctr, Padding::None)
                .unwrap();
        assert!(cfg.validate_key(&[0u8; 16]).is_ok());
        assert!(cfg.validate_key(&[0u8; 15]).is_err());
    }

    #[test]
    fn frameshift_range_bounds() {
        assert!(RangeConfiguration::frameshift(2, 8).is_ok());
        assert!(RangeConfiguration::frameshift(1, 8).is_err());
        assert!(RangeConfiguration::frameshift(8, 2).is_err());
    }

    #[test]
    fn authentication_configuration_equality_treats_absent_as_empty() {
        let mut a = AuthenticationConfiguration::hmac_sha256();
        let mut b = a.clone();
        a.additional_data = None;
        b.additional_data = Some(Vec::new());
        assert!(a.configuration_eq(&b));
    }

    #[test]
    fn entropy_scheme_data_round_trips_through_bincode() {
        let original = EntropySchemeData::StreamCipherCsprng {
            algorithm: StreamCipherAlgorithm::Rabbit,
            key: vec![1u8; 16],
            nonce: vec![2u8; 8],
        };
        let blob = original.to_bincode().unwrap();
        let decoded = EntropySchemeData::from_bincode(&blob).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn range_configuration_round_trips_through_bincode() {
        let original = RangeConfiguration::frameshift(4, 16).unwrap();
        let blob = original.to_bincode().unwrap();
        let decoded = RangeConfiguration::from_bincode(
            &blob,
            RangeConfiguration::FRAMESHIFT_MIN_FLOOR,
            RangeConfiguration::FRAMESHIFT_MAX_CEIL,
        )
        .unwrap();
        assert_eq!(original, decoded);
    }
}
