use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dataset::Record;

/// The one mutable piece of the dashboard: which slice of the dataset every
/// view is currently looking at. A plain serializable value — snapshot it,
/// compare it, hand it by reference to the query functions. All mutation
/// goes through the named setters below so the invariants hold:
///
/// - `active_entity` and `active_group` are never both set;
/// - setting either one rewrites `excluded_groups` to "everything except
///   the selected one's group" so the group toggles stay in sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// Selected legislator, by record url. Mutually exclusive with
    /// `active_group`.
    pub active_entity: Option<String>,

    /// Selected political group. Mutually exclusive with `active_entity`.
    pub active_group: Option<String>,

    /// Groups hidden from aggregate views (solo / hide-one toggles).
    pub excluded_groups: BTreeSet<String>,

    /// Multi-selected companies, as normalized keys. A record matches when
    /// any effective holding contains any selected key (union semantics).
    pub active_companies: BTreeSet<String>,

    /// Drop non-public and private-structure holdings from every
    /// aggregation.
    pub public_only: bool,

    /// Free-text table search (legislator or company name).
    pub search: String,
}

/// Distinct non-empty group names over a record set, used to rewrite the
/// exclusion set when an entity or group is selected.
pub fn distinct_groups(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| r.group().to_string())
        .collect::<BTreeSet<_>>()
}

impl FilterState {
    /// Select one legislator (or clear with `None`). Clears any group
    /// selection; the group buttons solo the legislator's own group.
    pub fn select_entity(&mut self, records: &[Record], url: Option<&str>) {
        self.active_group = None;
        match url {
            Some(url) => {
                self.active_entity = Some(url.to_string());
                let own_group = records
                    .iter()
                    .find(|r| r.url == url)
                    .map(|r| r.group().to_string());
                self.excluded_groups = match own_group {
                    Some(g) => {
                        let mut excluded = distinct_groups(records);
                        excluded.remove(&g);
                        excluded
                    }
                    None => BTreeSet::new(),
                };
            }
            None => {
                self.active_entity = None;
                self.excluded_groups.clear();
            }
        }
    }

    /// Select one political group (or clear with `None`). Clears any entity
    /// selection; all other groups become excluded so the toggles mirror
    /// the solo state.
    pub fn select_group(&mut self, records: &[Record], group: Option<&str>) {
        self.active_entity = None;
        match group {
            Some(group) => {
                self.active_group = Some(group.to_string());
                let mut excluded = distinct_groups(records);
                excluded.remove(group);
                self.excluded_groups = excluded;
            }
            None => {
                self.active_group = None;
                self.excluded_groups.clear();
            }
        }
    }

    /// Tri-state group toggle:
    /// - nothing excluded yet → solo this group (exclude all others);
    /// - this group excluded → re-enable it;
    /// - otherwise → exclude it.
    ///
    /// Any single-entity or single-group selection is dropped first.
    pub fn toggle_excluded_group(&mut self, records: &[Record], group: &str) {
        self.active_entity = None;
        self.active_group = None;

        if self.excluded_groups.is_empty() {
            let mut excluded = distinct_groups(records);
            excluded.remove(group);
            self.excluded_groups = excluded;
        } else if self.excluded_groups.contains(group) {
            self.excluded_groups.remove(group);
        } else {
            self.excluded_groups.insert(group.to_string());
        }
    }

    /// Toggle one company in the multi-selection. Takes the normalized key
    /// (see `normalize::normalize_key`). Returns true when the company is
    /// selected after the call.
    pub fn toggle_company(&mut self, key: &str) -> bool {
        if self.active_companies.contains(key) {
            self.active_companies.remove(key);
            false
        } else {
            self.active_companies.insert(key.to_string());
            true
        }
    }

    pub fn set_public_only(&mut self, on: bool) {
        self.public_only = on;
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.trim().to_string();
    }

    /// Back to the unfiltered view. Idempotent.
    pub fn clear_all(&mut self) {
        *self = FilterState {
            public_only: self.public_only,
            ..FilterState::default()
        };
    }

    /// Any filter active that narrows the record set.
    pub fn has_any(&self) -> bool {
        self.active_entity.is_some()
            || self.active_group.is_some()
            || !self.excluded_groups.is_empty()
            || !self.active_companies.is_empty()
            || !self.search.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;

    fn sample_records() -> Vec<Record> {
        let mut records = vec![
            Record {
                prenom: "Anne".into(),
                nom: "ALPHA".into(),
                url: "/a".into(),
                groupe: "X".into(),
                ..Record::default()
            },
            Record {
                prenom: "Bruno".into(),
                nom: "BETA".into(),
                url: "/b".into(),
                groupe: "Y".into(),
                ..Record::default()
            },
            Record {
                prenom: "Chloé".into(),
                nom: "GAMMA".into(),
                url: "/c".into(),
                groupe: "Z".into(),
                ..Record::default()
            },
        ];
        for r in &mut records {
            r.finalize();
        }
        records
    }

    #[test]
    fn test_entity_and_group_are_mutually_exclusive() {
        let records = sample_records();
        let mut state = FilterState::default();

        state.select_group(&records, Some("X"));
        assert_eq!(state.active_group.as_deref(), Some("X"));
        assert!(state.active_entity.is_none());

        state.select_entity(&records, Some("/b"));
        assert_eq!(state.active_entity.as_deref(), Some("/b"));
        assert!(state.active_group.is_none());
    }

    #[test]
    fn test_selection_solos_the_own_group() {
        let records = sample_records();
        let mut state = FilterState::default();

        state.select_group(&records, Some("Y"));
        assert_eq!(
            state.excluded_groups,
            ["X", "Z"].iter().map(|s| s.to_string()).collect()
        );

        state.select_entity(&records, Some("/a"));
        assert_eq!(
            state.excluded_groups,
            ["Y", "Z"].iter().map(|s| s.to_string()).collect()
        );

        state.select_group(&records, None);
        assert!(state.excluded_groups.is_empty());
    }

    #[test]
    fn test_toggle_excluded_group_tri_state() {
        let records = sample_records();
        let mut state = FilterState::default();

        // Nothing excluded yet: solo X
        state.toggle_excluded_group(&records, "X");
        assert!(!state.excluded_groups.contains("X"));
        assert!(state.excluded_groups.contains("Y"));
        assert!(state.excluded_groups.contains("Z"));

        // Re-enable an excluded group
        state.toggle_excluded_group(&records, "Y");
        assert!(!state.excluded_groups.contains("Y"));

        // Exclude an active group among others
        state.toggle_excluded_group(&records, "X");
        assert!(state.excluded_groups.contains("X"));
    }

    #[test]
    fn test_clear_all_is_idempotent() {
        let records = sample_records();
        let mut state = FilterState::default();
        state.select_group(&records, Some("X"));
        state.toggle_company("acme");
        state.set_search("martin");

        state.clear_all();
        let once = state.clone();
        state.clear_all();
        assert_eq!(state, once);
        assert!(!state.has_any());
    }

    #[test]
    fn test_clear_all_keeps_public_only_toggle() {
        let records = sample_records();
        let mut state = FilterState::default();
        state.set_public_only(true);
        state.select_group(&records, Some("X"));

        state.clear_all();
        assert!(state.public_only);
        assert!(state.active_group.is_none());
    }

    #[test]
    fn test_toggle_company_union_set() {
        let mut state = FilterState::default();
        assert!(state.toggle_company("acme"));
        assert!(state.toggle_company("globex"));
        assert_eq!(state.active_companies.len(), 2);
        assert!(!state.toggle_company("acme"));
        assert_eq!(state.active_companies.len(), 1);
    }
}
