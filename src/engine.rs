use std::collections::BTreeMap;

use tracing::warn;

use crate::client::PdnsClient;
use crate::config::{EnginePolicy, MigrationMode};
use crate::error::MigrateError;
use crate::model::{ChangeOp, ChangeType, Comment, MigratorAction, Record, Rrset, Zone};
use crate::txt;
use crate::zonename;

/// Reconciles one source zone against one target PowerDNS server.
///
/// Grounded on `original_source/powerdns_migrator/async_migrator.py`'s
/// `AsyncZoneMigrator`: `_sanitize_zone`/`_sanitize_rrsets` (Phase A),
/// `_sync_existing_zone`/`_rrset_key`/`_rrset_equal`/`_normalize_rrset`/
/// `_normalize_soa_content`/`_preserve_target_soa_serial` (Phase C), and
/// `migrate()` for the top-level dispatch. Phase B (CNAME conflict
/// policy) has no upstream counterpart in the retrieved source and is
/// implemented fresh from spec.md's own prose. The Python original was
/// constructed with one client per side (`source_client`/`target_client`
/// in `async_migrator.py::AsyncZoneMigrator.__init__`); this mirrors
/// that rather than sharing a single client for both roles.
pub struct ReconciliationEngine<'a> {
    source: &'a PdnsClient,
    target: &'a PdnsClient,
    policy: EnginePolicy,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(source: &'a PdnsClient, target: &'a PdnsClient, policy: EnginePolicy) -> Self {
        Self {
            source,
            target,
            policy,
        }
    }

    /// Runs the full migrate flow for one zone: fetch source, sanitize,
    /// apply CNAME policy, diff against (or create) the target.
    pub async fn migrate(
        &self,
        zone_name: &str,
        mode: MigrationMode,
    ) -> Result<crate::model::MigrationResult, MigrateError> {
        let zone_name = zonename::normalize(zone_name);
        let mut source = self.source.get_zone(&zone_name).await?;
        self.sanitize_zone(&mut source);
        self.apply_cname_policy(&mut source);

        let existing = self.target.zone_exists(&zone_name).await?;

        match existing {
            None => self.create(&zone_name, source, mode).await,
            Some(target) if mode.recreate => self.recreate(&zone_name, source, target, mode).await,
            Some(target) => self.sync_existing(&zone_name, source, target, mode).await,
        }
    }

    async fn create(
        &self,
        zone_name: &str,
        source: Zone,
        mode: MigrationMode,
    ) -> Result<crate::model::MigrationResult, MigrateError> {
        if mode.dry_run {
            return Ok(crate::model::MigrationResult {
                source_zone: source,
                target_zone: None,
                changes: Vec::new(),
                action: MigratorAction::CreateZone,
            });
        }
        let mut payload = source.clone();
        payload.name = zone_name.to_string();
        let created = self.target.create_zone(&payload).await?;
        Ok(crate::model::MigrationResult {
            source_zone: source,
            target_zone: Some(created),
            changes: Vec::new(),
            action: MigratorAction::CreateZone,
        })
    }

    async fn recreate(
        &self,
        zone_name: &str,
        source: Zone,
        target: Zone,
        mode: MigrationMode,
    ) -> Result<crate::model::MigrationResult, MigrateError> {
        if mode.dry_run {
            return Ok(crate::model::MigrationResult {
                source_zone: source,
                target_zone: Some(target),
                changes: Vec::new(),
                action: MigratorAction::RecreateZone,
            });
        }
        self.target.delete_zone(zone_name).await?;
        let mut payload = source.clone();
        payload.name = zone_name.to_string();
        let created = self.target.create_zone(&payload).await?;
        Ok(crate::model::MigrationResult {
            source_zone: source,
            target_zone: Some(created),
            changes: Vec::new(),
            action: MigratorAction::RecreateZone,
        })
    }

    async fn sync_existing(
        &self,
        zone_name: &str,
        source: Zone,
        target: Zone,
        mode: MigrationMode,
    ) -> Result<crate::model::MigrationResult, MigrateError> {
        let changes = self.diff(&source, &target);

        if changes.is_empty() {
            return Ok(crate::model::MigrationResult {
                source_zone: source,
                target_zone: Some(target),
                changes,
                action: MigratorAction::Noop,
            });
        }

        if mode.dry_run {
            return Ok(crate::model::MigrationResult {
                source_zone: source,
                target_zone: Some(target),
                changes,
                action: MigratorAction::PatchZone,
            });
        }

        self.target.patch_zone_rrsets(zone_name, &changes).await?;
        Ok(crate::model::MigrationResult {
            source_zone: source,
            target_zone: Some(target),
            changes,
            action: MigratorAction::PatchZone,
        })
    }

    /// Phase A. Drops every field the PowerDNS API returns that is not
    /// in the whitelist spec.md §3 names. Record content is retained
    /// verbatim except for TXT escape canonicalization, which is the
    /// only content rewrite spec.md's Phase A authorizes; SOA-serial
    /// handling is a Phase C (diff-time) concern.
    fn sanitize_zone(&self, zone: &mut Zone) {
        sanitize_zone(zone, &self.policy);
    }

    /// Phase B. See [`apply_cname_policy`].
    fn apply_cname_policy(&self, zone: &mut Zone) {
        apply_cname_policy(zone, &self.policy);
    }

    /// Phase C. Computes the DELETE/REPLACE change set needed to make
    /// `target` match `source`. See [`diff_zones`].
    fn diff(&self, source: &Zone, target: &Zone) -> Vec<ChangeOp> {
        diff_zones(source, target, &self.policy)
    }
}

/// Phase A. Drops every field the PowerDNS API returns that is not in
/// the whitelist spec.md §3 names. Record `content` is carried over
/// verbatim (spec.md §4.2 Phase A: "Each record retains `content`,
/// `disabled` ..., and `priority` if present") except for TXT escape
/// canonicalization, which is the only content rewrite this phase
/// authorizes; SOA content is never touched here.
///
/// Free function rather than a method so it can be exercised directly
/// in tests without standing up a [`PdnsClient`].
fn sanitize_zone(zone: &mut Zone, policy: &EnginePolicy) {
    zone.name = zonename::normalize(&zone.name);
    for rrset in zone.rrsets.iter_mut() {
        rrset.name = zonename::normalize(&rrset.name);
        sanitize_rrset(rrset, policy);
    }
}

fn sanitize_rrset(rrset: &mut Rrset, policy: &EnginePolicy) {
    if rrset.rrtype == "TXT" && policy.normalize_txt_escapes {
        for record in rrset.records.iter_mut() {
            record.content = txt::normalize_txt_escapes(&record.content);
        }
    }
}

/// Phase B. Enforces PowerDNS's CNAME exclusivity rule: a name cannot
/// have a CNAME rrset alongside any other rrtype, and the zone apex
/// can never carry a CNAME at all. Only mutates the zone when the
/// corresponding `--auto-fix-*` flag is set; otherwise conflicts are
/// left for the target API to reject.
///
/// Free function rather than a method so it can be exercised directly
/// in tests without standing up a [`PdnsClient`].
fn apply_cname_policy(zone: &mut Zone, policy: &EnginePolicy) {
    if policy.auto_fix_cname_conflicts {
        let apex_cname_positions: Vec<usize> = zone
            .rrsets
            .iter()
            .enumerate()
            .filter(|(_, r)| r.rrtype == "CNAME" && r.is_apex(&zone.name))
            .map(|(idx, _)| idx)
            .collect();
        if !apex_cname_positions.is_empty() {
            warn!(zone = %zone.name, "dropping apex CNAME, not valid in PowerDNS");
            for pos in apex_cname_positions.into_iter().rev() {
                zone.rrsets.remove(pos);
            }
        }
    }

    if policy.auto_fix_double_cname_conflicts {
        for rrset in zone.rrsets.iter_mut() {
            if rrset.rrtype != "CNAME" || rrset.records.len() <= 1 {
                continue;
            }
            let kept = rrset.records[0].clone();
            let removed: Vec<&str> = rrset.records[1..]
                .iter()
                .map(|r| r.content.as_str())
                .collect();
            warn!(
                zone = %zone.name, name = %rrset.name,
                kept = %kept.content, removed = ?removed, rrtype = %rrset.rrtype,
                "trimming multi-record CNAME rrset to its first record"
            );
            rrset.records.truncate(1);
        }
    }

    if policy.auto_fix_cname_conflicts {
        let cname_names: Vec<String> = zone
            .rrsets
            .iter()
            .filter(|r| r.rrtype == "CNAME")
            .map(|r| zonename::normalize(&r.name))
            .collect();
        let mut to_remove = Vec::new();
        for (idx, rrset) in zone.rrsets.iter().enumerate() {
            if rrset.rrtype == "CNAME" {
                continue;
            }
            let name = zonename::normalize(&rrset.name);
            if cname_names.contains(&name) {
                warn!(zone = %zone.name, name = %name, rrtype = %rrset.rrtype,
                    "dropping rrset that coexists with a CNAME at the same name");
                to_remove.push(idx);
            }
        }
        for idx in to_remove.into_iter().rev() {
            zone.rrsets.remove(idx);
        }
    }
}

/// Computes the DELETE/REPLACE change set needed to make `target` match
/// `source`, keyed on `(name, type)`. Deletes are ordered before
/// replaces per spec.md §4.2; within each group, `BTreeMap` iteration
/// order (sorted by key) keeps the output deterministic.
///
/// Free function rather than a method so it can be exercised directly
/// in tests without standing up a [`PdnsClient`].
fn diff_zones(source: &Zone, target: &Zone, policy: &EnginePolicy) -> Vec<ChangeOp> {
    let source_by_key: BTreeMap<(String, String), &Rrset> =
        source.rrsets.iter().map(|r| (r.key(), r)).collect();
    let target_by_key: BTreeMap<(String, String), &Rrset> =
        target.rrsets.iter().map(|r| (r.key(), r)).collect();

    let mut deletes = Vec::new();
    let mut replaces = Vec::new();

    for (key, target_rrset) in target_by_key.iter() {
        if !source_by_key.contains_key(key) {
            deletes.push(ChangeOp {
                name: key.0.clone(),
                rrtype: key.1.clone(),
                changetype: ChangeType::DELETE,
                ttl: target_rrset.ttl,
                records: Vec::new(),
                comments: None,
            });
        }
    }

    for (key, source_rrset) in source_by_key.iter() {
        let existing_target = target_by_key.get(key);
        let mut desired = (*source_rrset).clone();

        if key.1 == "SOA" && policy.ignore_soa_serial {
            if let Some(target_rrset) = existing_target {
                preserve_target_soa_serial(&mut desired, target_rrset);
            }
        }

        let needs_replace = match existing_target {
            None => true,
            Some(target_rrset) => !rrset_equal(&desired, target_rrset),
        };

        if needs_replace {
            replaces.push(ChangeOp {
                name: key.0.clone(),
                rrtype: key.1.clone(),
                changetype: ChangeType::REPLACE,
                ttl: desired.ttl,
                records: desired.records,
                comments: desired.comments,
            });
        }
    }

    deletes.into_iter().chain(replaces).collect()
}

/// Extracts the serial (2nd whitespace-separated field) from the target
/// zone's SOA content and substitutes it into `desired`'s SOA content,
/// so a serial-only drift does not trigger a spurious REPLACE.
fn preserve_target_soa_serial(desired: &mut Rrset, target_rrset: &Rrset) {
    let (Some(desired_record), Some(target_record)) =
        (desired.records.first_mut(), target_rrset.records.first())
    else {
        return;
    };
    let target_fields: Vec<&str> = target_record.content.split_whitespace().collect();
    let Some(&target_serial) = target_fields.get(2) else {
        return;
    };
    let mut fields: Vec<&str> = desired_record.content.split_whitespace().collect();
    if fields.len() > 2 {
        fields[2] = target_serial;
        desired_record.content = fields.join(" ");
    }
}

/// Semantic equality between a desired and an existing rrset: same TTL,
/// same multiset of records (content + disabled), same multiset of
/// comments, ignoring order — mirrors `async_migrator.py::_rrset_equal`
/// comparing `sorted(...)` tuples.
fn rrset_equal(a: &Rrset, b: &Rrset) -> bool {
    if a.ttl != b.ttl {
        return false;
    }
    sorted_record_keys(&a.records) == sorted_record_keys(&b.records)
        && sorted_comment_keys(a.comments.as_deref().unwrap_or(&[]))
            == sorted_comment_keys(b.comments.as_deref().unwrap_or(&[]))
}

fn sorted_record_keys(records: &[Record]) -> Vec<(String, bool, Option<i64>)> {
    let mut keys: Vec<_> = records
        .iter()
        .map(|r| (r.content.clone(), r.disabled, r.priority))
        .collect();
    keys.sort();
    keys
}

fn sorted_comment_keys(comments: &[Comment]) -> Vec<(String, bool, Option<String>, Option<i64>)> {
    let mut keys: Vec<_> = comments
        .iter()
        .map(|c| (c.content.clone(), c.disabled, c.account.clone(), c.modified_at))
        .collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(content: &str) -> Record {
        Record {
            content: content.to_string(),
            disabled: false,
            priority: None,
        }
    }

    fn rrset(name: &str, rrtype: &str, ttl: u32, records: Vec<Record>) -> Rrset {
        Rrset {
            name: name.to_string(),
            rrtype: rrtype.to_string(),
            ttl,
            records,
            comments: None,
        }
    }

    fn policy() -> EnginePolicy {
        EnginePolicy::default()
    }

    fn engine_diff(source: &Zone, target: &Zone, policy: EnginePolicy) -> Vec<ChangeOp> {
        diff_zones(source, target, &policy)
    }

    #[test]
    fn rrset_equal_ignores_record_order() {
        let a = rrset(
            "example.com.",
            "A",
            300,
            vec![record("1.1.1.1"), record("2.2.2.2")],
        );
        let b = rrset(
            "example.com.",
            "A",
            300,
            vec![record("2.2.2.2"), record("1.1.1.1")],
        );
        assert!(rrset_equal(&a, &b));
    }

    #[test]
    fn rrset_equal_detects_ttl_drift() {
        let a = rrset("example.com.", "A", 300, vec![record("1.1.1.1")]);
        let b = rrset("example.com.", "A", 600, vec![record("1.1.1.1")]);
        assert!(!rrset_equal(&a, &b));
    }

    #[test]
    fn preserve_target_soa_serial_keeps_target_serial_only() {
        let mut desired = rrset(
            "example.com.",
            "SOA",
            3600,
            vec![record("ns1.example.com. host.example.com. 5 7200 3600 1209600 3600")],
        );
        let target = rrset(
            "example.com.",
            "SOA",
            3600,
            vec![record("ns1.example.com. host.example.com. 99 7200 3600 1209600 3600")],
        );
        preserve_target_soa_serial(&mut desired, &target);
        assert_eq!(
            desired.records[0].content,
            "ns1.example.com. host.example.com. 99 7200 3600 1209600 3600"
        );
    }

    #[test]
    fn diff_orders_deletes_before_replaces() {
        let source = Zone {
            name: "example.com.".into(),
            kind: "Native".into(),
            masters: None,
            nameservers: None,
            account: None,
            soa_edit: None,
            soa_edit_api: None,
            rrsets: vec![rrset("a.example.com.", "A", 300, vec![record("1.1.1.1")])],
        };
        let target = Zone {
            name: "example.com.".into(),
            kind: "Native".into(),
            masters: None,
            nameservers: None,
            account: None,
            soa_edit: None,
            soa_edit_api: None,
            rrsets: vec![
                rrset("stale.example.com.", "A", 300, vec![record("9.9.9.9")]),
                rrset("a.example.com.", "A", 300, vec![record("2.2.2.2")]),
            ],
        };
        let changes = engine_diff(&source, &target, policy());
        assert_eq!(changes[0].changetype, ChangeType::DELETE);
        assert_eq!(changes[0].name, "stale.example.com.");
        assert_eq!(changes[1].changetype, ChangeType::REPLACE);
        assert_eq!(changes[1].name, "a.example.com.");
    }

    #[test]
    fn diff_is_noop_when_semantically_equal() {
        let source = Zone {
            name: "example.com.".into(),
            kind: "Native".into(),
            masters: None,
            nameservers: None,
            account: None,
            soa_edit: None,
            soa_edit_api: None,
            rrsets: vec![rrset("a.example.com.", "A", 300, vec![record("1.1.1.1")])],
        };
        let target = source.clone();
        assert!(engine_diff(&source, &target, policy()).is_empty());
    }

    fn zone_with(rrsets: Vec<Rrset>) -> Zone {
        Zone {
            name: "example.com.".into(),
            kind: "Native".into(),
            masters: None,
            nameservers: None,
            account: None,
            soa_edit: None,
            soa_edit_api: None,
            rrsets,
        }
    }

    #[test]
    fn apex_cname_is_always_dropped() {
        let mut zone = zone_with(vec![
            rrset("example.com.", "CNAME", 3600, vec![record("other.com.")]),
            rrset("example.com.", "A", 3600, vec![record("1.2.3.4")]),
        ]);
        let p = EnginePolicy {
            auto_fix_cname_conflicts: true,
            ..EnginePolicy::default()
        };
        apply_cname_policy(&mut zone, &p);
        assert_eq!(zone.rrsets.len(), 1);
        assert_eq!(zone.rrsets[0].rrtype, "A");
    }

    #[test]
    fn non_apex_coexisting_non_cname_is_dropped_in_favor_of_cname() {
        let mut zone = zone_with(vec![
            rrset("www.example.com.", "CNAME", 3600, vec![record("target.com.")]),
            rrset("www.example.com.", "TXT", 3600, vec![record("\"v\"")]),
            rrset("other.example.com.", "A", 3600, vec![record("1.1.1.1")]),
        ]);
        let p = EnginePolicy {
            auto_fix_cname_conflicts: true,
            ..EnginePolicy::default()
        };
        apply_cname_policy(&mut zone, &p);
        assert_eq!(zone.rrsets.len(), 2);
        assert!(zone
            .rrsets
            .iter()
            .any(|r| r.name == "www.example.com." && r.rrtype == "CNAME"));
        assert!(zone
            .rrsets
            .iter()
            .any(|r| r.name == "other.example.com." && r.rrtype == "A"));
    }

    #[test]
    fn no_cname_conflicts_leaves_zone_unchanged_without_flag() {
        let mut zone = zone_with(vec![
            rrset("example.com.", "CNAME", 3600, vec![record("other.com.")]),
            rrset("example.com.", "A", 3600, vec![record("1.2.3.4")]),
        ]);
        let p = EnginePolicy::default();
        apply_cname_policy(&mut zone, &p);
        assert_eq!(zone.rrsets.len(), 2);
    }

    #[test]
    fn double_cname_is_trimmed_to_first_record() {
        let mut zone = zone_with(vec![rrset(
            "www.example.com.",
            "CNAME",
            3600,
            vec![record("a.example.com."), record("b.example.com.")],
        )]);
        let p = EnginePolicy {
            auto_fix_double_cname_conflicts: true,
            ..EnginePolicy::default()
        };
        apply_cname_policy(&mut zone, &p);
        assert_eq!(zone.rrsets[0].records.len(), 1);
        assert_eq!(zone.rrsets[0].records[0].content, "a.example.com.");
    }

    #[test]
    fn single_record_cname_is_untouched_by_double_cname_policy() {
        let mut zone = zone_with(vec![rrset(
            "www.example.com.",
            "CNAME",
            3600,
            vec![record("a.example.com.")],
        )]);
        let p = EnginePolicy {
            auto_fix_double_cname_conflicts: true,
            ..EnginePolicy::default()
        };
        apply_cname_policy(&mut zone, &p);
        assert_eq!(zone.rrsets[0].records.len(), 1);
    }

    #[test]
    fn sanitize_zone_normalizes_names_but_leaves_record_content_untouched() {
        let mut zone = zone_with(vec![rrset(
            "a.example.com",
            "SOA",
            3600,
            vec![record("ns1.example.com.  host.example.com.  1  2 3 4 5")],
        )]);
        zone.name = "example.com".into();
        sanitize_zone(&mut zone, &EnginePolicy::default());
        assert_eq!(zone.name, "example.com.");
        assert_eq!(zone.rrsets[0].name, "a.example.com.");
        // Phase A retains record content verbatim (spec.md §4.2 Phase A);
        // SOA-serial normalization is a Phase C (diff-time) concern only.
        assert_eq!(
            zone.rrsets[0].records[0].content,
            "ns1.example.com.  host.example.com.  1  2 3 4 5"
        );
    }
}
