//! Hydration record keys.

use derive_more::{AsRef, Display};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Key of one hydration record: the hex digest of the hydration identity and
/// the serialized call arguments.
///
/// Server and client derive the key independently from the same inputs, so
/// it must be stable across processes; `serde_json` renders object keys in
/// sorted order, which keeps the argument serialization canonical.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, AsRef, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HydrationKey(String);

/// Derives the record key for a hydration identity and call arguments.
pub fn hydration_key(identity: &str, args: &Value) -> HydrationKey {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update([0u8]);
    hasher.update(args.to_string().as_bytes());
    HydrationKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_stable() {
        let a = hydration_key("feed", &json!([{"page": 1}]));
        let b = hydration_key("feed", &json!([{"page": 1}]));
        assert_eq!(a, b);
        assert_eq!(a.as_ref().len(), 64);
    }

    #[test]
    fn test_key_depends_on_identity_and_args() {
        let base = hydration_key("feed", &json!([1]));
        assert_ne!(base, hydration_key("feed", &json!([2])));
        assert_ne!(base, hydration_key("sidebar", &json!([1])));
    }
}
