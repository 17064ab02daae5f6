use serde::{Deserialize, Serialize};

use crate::zonename;

/// One resource record within an rrset. `content` is opaque except for
/// SOA and TXT, which the engine inspects narrowly (see
/// `crate::engine` and `crate::txt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// A comment attached to an rrset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub content: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
}

fn default_ttl() -> u32 {
    3600
}

/// A set of records sharing `(name, type)`. Identity key is
/// `(name, type)` per spec.md §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rrset {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl Rrset {
    /// `(name, type)` identity key, with the name normalized.
    pub fn key(&self) -> (String, String) {
        (zonename::normalize(&self.name), self.rrtype.clone())
    }

    pub fn is_apex(&self, zone_name: &str) -> bool {
        zonename::normalize(&self.name) == zonename::normalize(zone_name)
    }
}

fn default_kind() -> String {
    "Native".to_string()
}

/// A DNS zone as returned by (or sanitized for) the PowerDNS API. Only
/// the fields spec.md §3 whitelists for sanitization are kept as named
/// fields; everything else the API returns is discarded during
/// sanitize (an unknown-fields-permissive decoder would retain them,
/// but the sanitizing encoder never emits them, so they are simply not
/// modeled here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_edit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soa_edit_api: Option<String>,
    #[serde(default)]
    pub rrsets: Vec<Rrset>,
}

/// One DELETE or REPLACE operation in a change set, exactly the wire
/// shape spec.md §6 mandates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    pub changetype: ChangeType,
    pub ttl: u32,
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    DELETE,
    REPLACE,
}

/// The action a [`crate::engine::ReconciliationEngine`] took (or would
/// take, for `dry_run`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigratorAction {
    Noop,
    CreateZone,
    PatchZone,
    RecreateZone,
}

/// Outcome of a single-zone reconciliation.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub source_zone: Zone,
    pub target_zone: Option<Zone>,
    pub changes: Vec<ChangeOp>,
    pub action: MigratorAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrset_key_normalizes_name() {
        let rr = Rrset {
            name: "example.com".into(),
            rrtype: "A".into(),
            ttl: 300,
            records: vec![],
            comments: None,
        };
        assert_eq!(rr.key(), ("example.com.".to_string(), "A".to_string()));
    }

    #[test]
    fn rrset_is_apex_compares_normalized() {
        let rr = Rrset {
            name: "example.com".into(),
            rrtype: "SOA".into(),
            ttl: 3600,
            records: vec![],
            comments: None,
        };
        assert!(rr.is_apex("example.com."));
        assert!(!rr.is_apex("sub.example.com."));
    }

    #[test]
    fn zone_defaults_kind_to_native_on_missing_field() {
        let json = r#"{"name": "example.com.", "rrsets": []}"#;
        let zone: Zone = serde_json::from_str(json).unwrap();
        assert_eq!(zone.kind, "Native");
    }

    #[test]
    fn record_default_fields() {
        let json = r#"{"content": "1.2.3.4"}"#;
        let rec: Record = serde_json::from_str(json).unwrap();
        assert!(!rec.disabled);
        assert_eq!(rec.priority, None);
    }

    #[test]
    fn change_op_serializes_changetype_uppercase() {
        let op = ChangeOp {
            name: "example.com.".into(),
            rrtype: "A".into(),
            changetype: ChangeType::DELETE,
            ttl: 3600,
            records: vec![],
            comments: None,
        };
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["changetype"], "DELETE");
    }
}
