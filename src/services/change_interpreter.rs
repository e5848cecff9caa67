use chrono::{DateTime, Utc};

use crate::domain::models::{ChangeType, KeyHistory, ObjectChange};

/// Interpret one key's history into its typed changes at or after `since`.
///
/// Classification walks the full sorted history so that genesis detection
/// and predecessor links see versions older than the window:
/// - a delete marker becomes DELETE
/// - the key's oldest content version becomes CREATE
/// - any other content version becomes UPDATE, patched to UNDELETE when
///   the previously emitted change is a DELETE
///
/// Predecessor links: the first emitted UPDATE points at the freshest
/// content version strictly before `since`; later UPDATEs point at the
/// previously emitted content change; an UNDELETE points at the content
/// version positioned before its tombstone in the full history.
pub fn changes_for_key(history: &KeyHistory, since: DateTime<Utc>) -> Vec<ObjectChange> {
    let records = &history.records;
    let genesis_id = history.genesis().map(|g| g.version_id.clone());

    // Indices into the full history of everything inside the window.
    // The cutoff instant itself belongs to the window.
    let window: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.last_modified >= since)
        .map(|(idx, _)| idx)
        .collect();

    let mut changes: Vec<ObjectChange> = Vec::with_capacity(window.len());

    for (emit_idx, &rec_idx) in window.iter().enumerate() {
        let record = &records[rec_idx];

        let mut change_type = if record.is_delete_marker {
            ChangeType::Delete
        } else if genesis_id.as_ref() == Some(&record.version_id) {
            ChangeType::Create
        } else {
            ChangeType::Update
        };

        if change_type == ChangeType::Update
            && emit_idx > 0
            && changes[emit_idx - 1].is_delete_marker
        {
            change_type = ChangeType::Undelete;
        }

        let previous_version_id = match change_type {
            ChangeType::Update => {
                let prior_content = changes.iter().rev().find(|c| !c.is_delete_marker);
                match prior_content {
                    Some(prior) => Some(prior.version_id.clone()),
                    // First content change of the window: the predecessor
                    // is whatever was current just before the cutoff.
                    None => history
                        .latest_content_before(since)
                        .map(|v| v.version_id.as_str().to_string()),
                }
            }
            ChangeType::Undelete => {
                // The tombstone sits at window[emit_idx - 1]; restore from
                // the content version positioned before it.
                let marker_idx = window[emit_idx - 1];
                records[..marker_idx]
                    .iter()
                    .rev()
                    .find(|r| !r.is_delete_marker)
                    .map(|r| r.version_id.as_str().to_string())
            }
            _ => None,
        };

        changes.push(ObjectChange {
            key: record.key.clone(),
            version_id: record.version_id.as_str().to_string(),
            change_type,
            timestamp: record.last_modified,
            size: record.size,
            etag: record.etag.clone(),
            is_delete_marker: record.is_delete_marker,
            previous_version_id,
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::VersionRecord;
    use crate::domain::value_objects::VersionId;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap()
    }

    fn vid(s: &str) -> VersionId {
        VersionId::new(s).unwrap()
    }

    fn history(records: Vec<VersionRecord>) -> KeyHistory {
        KeyHistory::new("k", records)
    }

    #[test]
    fn empty_window_emits_nothing() {
        let h = history(vec![VersionRecord::version("k", vid("v1"), at(1))]);
        assert!(changes_for_key(&h, at(2)).is_empty());
    }

    #[test]
    fn genesis_inside_window_is_create() {
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(3)),
            VersionRecord::version("k", vid("v2"), at(4)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::Create);
        assert_eq!(changes[0].previous_version_id, None);
        assert_eq!(changes[1].change_type, ChangeType::Update);
        assert_eq!(changes[1].previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn update_links_to_version_before_cutoff() {
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::version("k", vid("v2"), at(3)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn delete_then_content_becomes_undelete_with_pre_cutoff_predecessor() {
        // v1@1h, tombstone@2h, v2@3h, cutoff at the tombstone
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::version("k", vid("v2"), at(3)),
            VersionRecord::delete_marker("k", vid("d1"), at(2)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, ChangeType::Delete);
        assert_eq!(changes[0].previous_version_id, None);
        assert_eq!(changes[1].change_type, ChangeType::Undelete);
        assert_eq!(changes[1].previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn undelete_skips_consecutive_tombstones() {
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::version("k", vid("v2"), at(4)),
            VersionRecord::delete_marker("k", vid("d1"), at(2)),
            VersionRecord::delete_marker("k", vid("d2"), at(3)),
        ]);
        let changes = changes_for_key(&h, at(2));
        let undelete = changes.last().unwrap();
        assert_eq!(undelete.change_type, ChangeType::Undelete);
        assert_eq!(undelete.previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn lone_tombstone_has_no_predecessor() {
        let h = history(vec![VersionRecord::delete_marker("k", vid("d1"), at(3))]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Delete);
        assert_eq!(changes[0].previous_version_id, None);
    }

    #[test]
    fn cutoff_instant_belongs_to_the_window() {
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::version("k", vid("v2"), at(2)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].version_id, "v2");
        assert_eq!(changes[0].previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn genesis_at_cutoff_still_chains_to_followers() {
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(2)),
            VersionRecord::version("k", vid("v2"), at(3)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes[0].change_type, ChangeType::Create);
        assert_eq!(changes[1].change_type, ChangeType::Update);
        assert_eq!(changes[1].previous_version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn store_tie_order_is_preserved() {
        // Two versions sharing an instant keep store order and chain
        let h = history(vec![
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::version("k", vid("v2"), at(2)),
            VersionRecord::version("k", vid("v3"), at(2)),
        ]);
        let changes = changes_for_key(&h, at(2));
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].version_id, "v2");
        assert_eq!(changes[1].version_id, "v3");
        assert_eq!(changes[1].previous_version_id.as_deref(), Some("v2"));
    }

    #[test]
    fn timestamps_are_non_decreasing() {
        let h = history(vec![
            VersionRecord::version("k", vid("v2"), at(3)),
            VersionRecord::version("k", vid("v1"), at(1)),
            VersionRecord::delete_marker("k", vid("d1"), at(4)),
            VersionRecord::version("k", vid("v3"), at(5)),
        ]);
        let changes = changes_for_key(&h, at(0));
        for pair in changes.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
