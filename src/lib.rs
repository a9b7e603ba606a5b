// obscurcore is a library for building authenticated, confidential packages:
// self-describing binary containers that bundle multiple payload items,
// encrypt each individually, and obfuscate their boundaries and ordering
// within one ciphertext stream.
//
// Two subsystems make up the core: the cipher stream decorator
// (`cipher_stream`) that bridges arbitrarily-fragmented caller I/O to a
// cipher's fixed operation size, and the payload multiplexer (`mux`) that
// interleaves many items' Encrypt-then-MAC byte streams into one package
// under a keystream-driven schedule. Everything else in this crate —
// primitive bindings, mode/padding composition, the MAC decorator, key
// confirmation — exists to support those two.
//
// Out of scope, per design: manifest-level orchestration, file-system
// walking, the DTO wire format, CLI, and EC J-PAKE/UM1 key exchange. Callers
// assemble `PayloadItem`s and configuration themselves and drive
// `PayloadMux` directly.

pub mod cipher_stream;
pub mod cipher_wrapper;
pub mod confirm;
pub mod config;
pub mod csprng;
pub mod error;
pub mod keys;
pub mod mac_stream;
pub mod mode;
pub mod mux;
pub mod padding;
pub mod primitive;
pub mod ring;
pub mod util;

pub use cipher_stream::CipherStream;
pub use config::{
    AuthenticationConfiguration, CipherConfiguration, PayloadConfiguration, PayloadItem,
};
pub use error::ObscurCoreError;
pub use keys::{Canary, SymmetricKey};
pub use mac_stream::MacStream;
pub use mux::PayloadMux;
