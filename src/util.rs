// Constant-time comparison helpers shared by padding verification, MAC
// verification and key/canary comparison.
//
// Built on `subtle::ConstantTimeEq` rather than a hand-rolled
// XOR-accumulate loop, since `subtle` is exactly that accumulate-into-one-mask
// implementation, written by people who have thought hard about the compiler
// not optimising it away.

use subtle::ConstantTimeEq;

/// Constant-time equality over two equal-or-unequal-length byte slices.
///
/// Returns `false` immediately on length mismatch: the comparison itself
/// must not leak *which* byte differs, but a length difference is not
/// itself secret for any use in this crate — MAC tags, canaries and padding
/// bytes are always compared at a fixed, publicly-known length.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
