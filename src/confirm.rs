// Key confirmation.
//
// Identifies which key, if any, in a candidate set produced a published
// "verified output" — without ever transmitting the key itself. The input
// to the confirmation function is the key's *canary*, not the key, so a
// verifier only needs canaries and the published output, never raw key
// material.
//
// Parallel evaluation uses `thread::scope` with polled atomic flags
// (`found`/`matched`) for cooperative cancellation, rather than reaching for
// a task runtime — this crate has no async executor and none of its other
// concurrency (the mux, the cipher stream) needs one either.

use crate::config::{AuthenticationConfiguration, AuthFnKind, FunctionConfiguration};
use crate::error::{ConfigError, ObscurCoreError};
use crate::keys::Canary;
use crate::primitive;
use crate::util::ct_eq;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// Domain-separates key confirmation from any other use of the same
/// KDF/MAC function over the same canary.
const TAG_CONSTANT: &[u8] = b"obscurcore-key-confirmation-v1";

/// Builds `tag_constant ∥ salt ∥ additional_data ∥ message`, the super-salt
/// fed to the configured KDF or keyed MAC.
fn super_salt(auth_config: &AuthenticationConfiguration, message: &[u8]) -> Vec<u8> {
    let mut buf = Vec::from(TAG_CONSTANT);
    if let Some(salt) = &auth_config.salt {
        buf.extend_from_slice(salt);
    }
    if let Some(additional_data) = &auth_config.additional_data {
        buf.extend_from_slice(additional_data);
    }
    buf.extend_from_slice(message);
    buf
}

/// Runs the configured KDF or keyed MAC over `canary` with the given
/// super-salt as input, producing the confirmation output.
fn run_function(
    auth_config: &AuthenticationConfiguration,
    canary: &Canary,
    super_salt: &[u8],
) -> Result<Vec<u8>, ObscurCoreError> {
    match auth_config.kind {
        AuthFnKind::Kdf => {
            let algorithm = match &auth_config.function_configuration {
                FunctionConfiguration::Kdf { algorithm, .. } => *algorithm,
                _ => return Err(ConfigError::MissingAuthKey(auth_config.kind).into()),
            };
            let output_len = auth_config.output_size_bytes.unwrap_or(32);
            Ok(primitive::kdf_derive(
                algorithm,
                canary.as_bytes(),
                super_salt,
                output_len,
            )?)
        }
        AuthFnKind::Mac => {
            let mac_algorithm = auth_config
                .mac_algorithm
                .ok_or(ConfigError::MissingAuthKey(auth_config.kind))?;
            let mut mac = primitive::make_mac(mac_algorithm, canary.as_bytes())?;
            mac.update(super_salt);
            let mut out = vec![0u8; mac.output_size()];
            mac.do_final(&mut out);
            Ok(out)
        }
        AuthFnKind::Hash | AuthFnKind::None => {
            Err(ConfigError::MissingAuthKey(auth_config.kind).into())
        }
    }
}

/// Generates the published verified-output for `canary` under `auth_config`,
/// binding it to `message` (ordinarily the manifest or package identity this
/// confirmation is scoped to).
pub fn generate(
    auth_config: &AuthenticationConfiguration,
    canary: &Canary,
    message: &[u8],
) -> Result<Vec<u8>, ObscurCoreError> {
    run_function(auth_config, canary, &super_salt(auth_config, message))
}

/// The EC hybrid two-canary flavour: combines a sender and recipient canary
/// via byte-wise XOR (padded with trailing zeros to the longer length, see
/// [`Canary::combine`]) before running the single-canary algorithm.
pub fn generate_two_canary(
    auth_config: &AuthenticationConfiguration,
    sender_canary: &Canary,
    recipient_canary: &Canary,
    message: &[u8],
) -> Result<Vec<u8>, ObscurCoreError> {
    generate(auth_config, &sender_canary.combine(recipient_canary), message)
}

/// Identifies which candidate's canary produced `verified_output`, evaluating
/// candidates concurrently. Returns the first candidate (by the caller's
/// ordering) whose recomputed output constant-time-matches; `None` if no
/// candidate matches.
///
/// Workers cooperatively stop once any match is found: each checks the
/// shared `found` flag before starting its (potentially expensive, e.g.
/// Argon2id) computation and again before publishing a result, so a match
/// early in the set curtails — but does not forcibly abort — work still in
/// flight on other candidates.
pub fn confirm<'a, T: Sync>(
    auth_config: &AuthenticationConfiguration,
    message: &[u8],
    verified_output: &[u8],
    candidates: &'a [(T, Canary)],
) -> Option<&'a T> {
    let super_salt = super_salt(auth_config, message);
    let found = AtomicBool::new(false);
    let matched = AtomicUsize::new(usize::MAX);

    thread::scope(|scope| {
        for (idx, (_, canary)) in candidates.iter().enumerate() {
            if found.load(Ordering::Relaxed) {
                break;
            }
            let super_salt = &super_salt;
            let found = &found;
            let matched = &matched;
            scope.spawn(move || {
                if found.load(Ordering::Relaxed) {
                    return;
                }
                let candidate_output = match run_function(auth_config, canary, super_salt) {
                    Ok(out) => out,
                    Err(_) => return,
                };
                if found.load(Ordering::Relaxed) {
                    return;
                }
                if ct_eq(&candidate_output, verified_output) {
                    matched.store(idx, Ordering::Relaxed);
                    found.store(true, Ordering::Relaxed);
                }
            });
        }
    });

    match matched.load(Ordering::Relaxed) {
        usize::MAX => None,
        idx => Some(&candidates[idx].0),
    }
}
