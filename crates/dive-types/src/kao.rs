//! Key Access Objects: policy-bound wrapped DEKs carried by a ZTDF resource.

use serde::{Deserialize, Serialize};

use crate::clearance::Clearance;

/// The policy a KAS enforces before unwrapping a KAO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBinding {
    pub clearance_required: Clearance,
    #[serde(default)]
    pub countries_allowed: Vec<String>,
    /// Communities whose key wraps this KAO. The first tag names the key.
    #[serde(default)]
    pub coi_required: Vec<String>,
}

/// A single wrapped copy of a resource's DEK.
///
/// A resource may carry several KAOs (one per COI, nation or redundancy
/// path); any one of them is sufficient to recover the DEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAccessObject {
    pub kao_id: String,
    pub kas_url: String,
    pub kas_id: String,
    /// Base64 wrapped key.
    pub wrapped_key: String,
    pub wrapping_algorithm: String,
    pub policy_binding: PolicyBinding,
}

impl KeyAccessObject {
    /// The COI whose key wraps this KAO, if any.
    pub fn coi(&self) -> Option<&str> {
        self.policy_binding.coi_required.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kao_wire_shape() {
        let json = r#"{
            "kaoId": "kao-fvey",
            "kasUrl": "https://kas.gbr.example/kas",
            "kasId": "gbr-kas",
            "wrappedKey": "AAAA",
            "wrappingAlgorithm": "AES-256-GCM",
            "policyBinding": {
                "clearanceRequired": "SECRET",
                "countriesAllowed": ["USA", "GBR"],
                "coiRequired": ["FVEY"]
            }
        }"#;
        let kao: KeyAccessObject = serde_json::from_str(json).unwrap();
        assert_eq!(kao.coi(), Some("FVEY"));
        assert_eq!(kao.policy_binding.clearance_required, Clearance::Secret);
    }
}
