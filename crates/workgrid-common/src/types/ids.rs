//! Fixed-width 32-byte identifiers

use crate::error::IdentifierError;
use crate::types::address::decode_fixed;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier length in bytes
pub const ID_LEN: usize = 32;

macro_rules! bytes32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; ID_LEN]);

        impl $name {
            pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<ID_LEN>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

bytes32_id!(
    /// Opaque worker identifier, immutable once assigned
    WorkerId
);

bytes32_id!(
    /// Opaque task identifier
    TaskId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parse() {
        let raw = "0x986c754145a7621b7fabb66cdef12c96e83bec2121f2fa34e16f78e106ab9863";
        let id: TaskId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert_eq!(id.as_bytes()[0], 0x98);
    }

    #[test]
    fn test_worker_id_rejects_short() {
        assert!("0x690eb162".parse::<WorkerId>().is_err());
    }

    #[test]
    fn test_debug_includes_type() {
        let id = WorkerId([1u8; 32]);
        assert!(format!("{:?}", id).starts_with("WorkerId(0x0101"));
    }
}
