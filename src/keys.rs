// `SymmetricKey` and its permission bitflags.
//
// Raw key bytes are carried in a `zeroize::Zeroizing<Vec<u8>>` so that the
// buffer is wiped the moment it's dropped, without requiring callers to
// remember to do it themselves. This is a genuine addition over the
// teacher's raw `Vec<u8>` keys, recorded in DESIGN.md.

use crate::util::ct_eq;

use zeroize::Zeroizing;

/// Declares a small bitflags-shaped type without pulling in the `bitflags`
/// crate for four constants total.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $repr:ty {
            $(const $flag:ident = $value:expr;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
        $vis struct $name($repr);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

bitflags_like! {
    /// What a [`SymmetricKey`] may be used for.
    pub struct KeyUse: u8 {
        const ENCRYPTION = 0b0001;
        const AUTHENTICATION = 0b0010;
        const KDF = 0b0100;
        const KEY_WRAP = 0b1000;
    }
}

bitflags_like! {
    /// Which context(s) a [`SymmetricKey`] is valid in.
    pub struct KeyContext: u8 {
        const MANIFEST_HEADER = 0b01;
        const PAYLOAD_ITEM = 0b10;
    }
}

/// Per-key random bytes used exclusively as key-confirmation input, never
/// transmitted directly.
#[derive(Clone, Debug, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct Canary(Vec<u8>);

impl Canary {
    pub const LEN: usize = 32;

    pub fn generate(rng: &mut impl rand::RngCore) -> Self {
        let mut buf = vec![0u8; Self::LEN];
        rng.fill_bytes(&mut buf);
        Self(buf)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Combines two canaries (a sender and recipient canary, hybrid flavour)
    /// via byte-wise XOR, padding the shorter input with trailing zero bytes.
    pub fn combine(&self, other: &Self) -> Self {
        let len = self.0.len().max(other.0.len());
        let mut combined = vec![0u8; len];
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            combined[i] = a ^ b;
        }
        Self(combined)
    }
}

/// Raw key material plus the use/context metadata it's validated against.
#[derive(Clone, Debug)]
pub struct SymmetricKey {
    raw: Zeroizing<Vec<u8>>,
    additional_data: Option<Vec<u8>>,
    use_permissions: KeyUse,
    context_permissions: KeyContext,
    canary: Canary,
}

impl SymmetricKey {
    pub fn new(
        raw: Vec<u8>,
        canary: Canary,
        use_permissions: KeyUse,
        context_permissions: KeyContext,
    ) -> Self {
        Self {
            raw: Zeroizing::new(raw),
            additional_data: None,
            use_permissions,
            context_permissions,
            canary,
        }
    }

    pub fn with_additional_data(mut self, additional_data: Vec<u8>) -> Self {
        self.additional_data = Some(additional_data);
        self
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn additional_data(&self) -> Option<&[u8]> {
        self.additional_data.as_deref()
    }

    pub fn use_permissions(&self) -> KeyUse {
        self.use_permissions
    }

    pub fn context_permissions(&self) -> KeyContext {
        self.context_permissions
    }

    pub fn canary(&self) -> &Canary {
        &self.canary
    }
}

impl PartialEq for SymmetricKey {
    /// Constant-time comparison — must not leak a length mismatch before the
    /// body comparison completes.
    fn eq(&self, other: &Self) -> bool {
        ct_eq(&self.raw, &other.raw)
    }
}

impl Eq for SymmetricKey {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn equal_keys_compare_equal() {
        let k1 = SymmetricKey::new(
            vec![1, 2, 3, 4],
            Canary::from_bytes(vec![0; 32]),
            KeyUse::ENCRYPTION,
            KeyContext::PAYLOAD_ITEM,
        );
        let k2 = SymmetricKey::new(
            vec![1, 2, 3, 4],
            Canary::from_bytes(vec![0xff; 32]),
            KeyUse::ENCRYPTION,
            KeyContext::PAYLOAD_ITEM,
        );
        assert_eq!(k1, k2);
    }

    #[test]
    fn differing_length_keys_compare_unequal() {
        let k1 = SymmetricKey::new(
            vec![1, 2, 3],
            Canary::from_bytes(vec![0; 32]),
            KeyUse::ENCRYPTION,
            KeyContext::PAYLOAD_ITEM,
        );
        let k2 = SymmetricKey::new(
            vec![1, 2, 3, 4],
            Canary::from_bytes(vec![0; 32]),
            KeyUse::ENCRYPTION,
            KeyContext::PAYLOAD_ITEM,
        );
        assert_ne!(k1, k2);
    }

    #[test]
    fn canary_combine_is_symmetric_xor() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Canary::generate(&mut rng);
        let b = Canary::generate(&mut rng);
        assert_eq!(a.combine(&b).as_bytes(), b.combine(&a).as_bytes());
    }

    #[test]
    fn key_use_permissions_compose() {
        let both = KeyUse::ENCRYPTION | KeyUse::AUTHENTICATION;
        assert!(both.contains(KeyUse::ENCRYPTION));
        assert!(both.contains(KeyUse::AUTHENTICATION));
        assert!(!both.contains(KeyUse::KDF));
    }
}
