use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::dataset::{Holding, Record};
use crate::filter::FilterState;
use crate::normalize::{is_non_public, is_private_structure, median, normalize_key};

// ============================================================================
// GROUP COLORS
// ============================================================================

/// Fallback palette for groups the dataset supplies no color for, assigned
/// in first-encounter order.
pub const FALLBACK_COLORS: &[&str] = &[
    "#6366f1", "#f59e0b", "#10b981", "#ef4444", "#3b82f6", "#8b5cf6",
    "#ec4899", "#14b8a6", "#f97316", "#84cc16", "#06b6d4", "#a855f7",
    "#64748b",
];

/// Session cache of group → display color. Source-supplied colors win and
/// are written once (first writer); everything else draws from the fallback
/// palette. Colors are never reassigned while cached, so a dataset switch
/// must call `reset()` — stale colors otherwise survive the switch.
#[derive(Debug, Default)]
pub struct GroupColors {
    assigned: HashMap<String, String>,
    next_fallback: usize,
}

impl GroupColors {
    /// Seed the cache with the colors the dataset itself supplies.
    pub fn seed(&mut self, records: &[Record]) {
        for record in records {
            if record.couleur_groupe.is_empty() {
                continue;
            }
            self.assigned
                .entry(record.group().to_string())
                .or_insert_with(|| record.couleur_groupe.clone());
        }
    }

    /// Stable display color for a group.
    pub fn color_of(&mut self, group: &str) -> String {
        if group.is_empty() {
            return "#445".to_string();
        }
        if let Some(color) = self.assigned.get(group) {
            return color.clone();
        }
        let color = FALLBACK_COLORS[self.next_fallback % FALLBACK_COLORS.len()].to_string();
        self.next_fallback += 1;
        self.assigned.insert(group.to_string(), color.clone());
        color
    }

    /// Drop every cached assignment. Called when the dataset changes
    /// (chamber switch), where the group universe is disjoint.
    pub fn reset(&mut self) {
        self.assigned.clear();
        self.next_fallback = 0;
    }
}

// ============================================================================
// SHORT GROUP NAMES
// ============================================================================

/// Readable short names for the chart axes and group buttons.
const SHORT_GROUP_NAMES: &[(&str, &str)] = &[
    // Assemblée Nationale
    ("Rassemblement National", "Rassemblement National"),
    ("Ensemble pour la République", "Ensemble"),
    ("La France insoumise - Nouveau Front Populaire", "La France Insoumise"),
    ("Socialistes et apparentés", "Socialistes"),
    ("Droite Républicaine", "Droite Républicaine"),
    ("Écologiste et Social", "Écologiste et Social"),
    ("Les Démocrates", "Les Démocrates"),
    ("Horizons & Indépendants", "Horizons"),
    ("Libertés, Indépendants, Outre-mer et Territoires", "Libertés Outre-mer"),
    ("Gauche Démocrate et Républicaine", "Gauche Démocrate"),
    ("Union des droites pour la République", "Union des droites"),
    // Sénat
    ("Les Républicains", "Les Républicains"),
    ("Rassemblement des démocrates progressistes et indépendants", "RDPI"),
    ("Socialistes, Écologistes et Républicains", "SER"),
    ("Union Centriste", "UC"),
    ("Les Indépendants - République et Territoires", "Les Indépendants"),
    ("Écologiste - Solidarité et Territoires", "Écologistes"),
    ("Communiste Républicain Citoyen et Écologiste - Kanaky", "CRCE-K"),
    ("Rassemblement Démocratique et Social Européen", "RDSE"),
    // Commun
    ("Non inscrit", "Non inscrit"),
    ("Inconnu", "Inconnu"),
];

/// Short display name for a group: fixed table, then the dataset's own
/// sigle when one is known, then the full name unchanged.
pub fn short_group_name<'a>(full: &'a str, sigle: &'a str) -> &'a str {
    if let Some((_, short)) = SHORT_GROUP_NAMES.iter().find(|(name, _)| *name == full) {
        return short;
    }
    if !sigle.is_empty() {
        return sigle;
    }
    full
}

// ============================================================================
// VISIBILITY & EFFECTIVE HOLDINGS
// ============================================================================

/// Records matching the active filter. Single-active-axis priority:
/// entity, else group, else exclusions, else everything.
pub fn visible_records<'a>(records: &'a [Record], state: &FilterState) -> Vec<&'a Record> {
    if let Some(url) = &state.active_entity {
        return records.iter().filter(|r| &r.url == url).collect();
    }
    if let Some(group) = &state.active_group {
        return records.iter().filter(|r| r.group() == group).collect();
    }
    if !state.excluded_groups.is_empty() {
        return records
            .iter()
            .filter(|r| !state.excluded_groups.contains(r.group()))
            .collect();
    }
    records.iter().collect()
}

/// The holdings every downstream sum must use. With `public_only` off this
/// is the full declared list; with it on, non-public and private-structure
/// lines are dropped.
pub fn effective_holdings<'a>(record: &'a Record, state: &FilterState) -> Vec<&'a Holding> {
    record
        .participations
        .iter()
        .filter(|p| {
            !state.public_only
                || (!is_non_public(&p.societe) && !is_private_structure(&p.societe))
        })
        .collect()
}

/// Sum of effective holding values for one record.
pub fn effective_total(record: &Record, state: &FilterState) -> f64 {
    effective_holdings(record, state)
        .iter()
        .map(|p| p.value())
        .sum()
}

/// Company multi-selection match: at least one effective holding whose
/// normalized name contains at least one selected key. An empty selection
/// matches everything (no company filter active).
pub fn company_matches(record: &Record, state: &FilterState) -> bool {
    if state.active_companies.is_empty() {
        return true;
    }
    effective_holdings(record, state).iter().any(|p| {
        let norm = normalize_key(&p.societe);
        state.active_companies.iter().any(|key| norm.contains(key))
    })
}

/// Value a record holds in one specific company (by normalized key),
/// summed over matching effective holdings. Used by the company sort
/// columns; a record with no matching holding is worth 0.
pub fn company_value(record: &Record, state: &FilterState, key: &str) -> f64 {
    effective_holdings(record, state)
        .iter()
        .filter(|p| normalize_key(&p.societe).contains(key))
        .map(|p| p.value())
        .sum()
}

// ============================================================================
// GROUP AGGREGATES
// ============================================================================

/// Per-group summary over a (pre-filtered) record slice.
#[derive(Debug, Clone, Serialize)]
pub struct GroupAggregate {
    pub groupe: String,
    pub couleur: String,
    /// Members in the slice.
    pub deputes: usize,
    /// Members with at least one effective holding.
    pub avec_part: usize,
    /// Sum of effective holding counts.
    pub total_participations: usize,
    /// Sum of effective holding values.
    pub valeur: f64,
    /// Per-member effective totals (members with ≥1 holding only),
    /// the median population for the group charts.
    pub valeurs: Vec<f64>,
}

impl GroupAggregate {
    pub fn mediane(&self) -> f64 {
        median(&self.valeurs)
    }

    /// Share of members with at least one effective holding, 0..=1.
    pub fn part_ratio(&self) -> f64 {
        if self.deputes == 0 {
            0.0
        } else {
            self.avec_part as f64 / self.deputes as f64
        }
    }
}

/// Aggregate a record slice by political group, ordered by descending total
/// value (a rendering convenience, recomputed every call).
pub fn aggregate_by_group(
    records: &[&Record],
    state: &FilterState,
    colors: &mut GroupColors,
) -> Vec<GroupAggregate> {
    let mut map: HashMap<&str, GroupAggregate> = HashMap::new();

    for record in records {
        let group = record.group();
        let entry = map.entry(group).or_insert_with(|| GroupAggregate {
            groupe: group.to_string(),
            couleur: colors.color_of(group),
            deputes: 0,
            avec_part: 0,
            total_participations: 0,
            valeur: 0.0,
            valeurs: Vec::new(),
        });

        let holdings = effective_holdings(record, state);
        let value: f64 = holdings.iter().map(|p| p.value()).sum();

        entry.deputes += 1;
        entry.total_participations += holdings.len();
        entry.valeur += value;
        if !holdings.is_empty() {
            entry.avec_part += 1;
            entry.valeurs.push(value);
        }
    }

    let mut aggregates: Vec<GroupAggregate> = map.into_values().collect();
    aggregates.sort_by(|a, b| {
        b.valeur
            .partial_cmp(&a.valeur)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.groupe.cmp(&b.groupe))
    });
    aggregates
}

// ============================================================================
// KPI SUMMARY
// ============================================================================

/// Headline figures over the visible records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KpiSummary {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    /// Median over members with a strictly positive effective total only;
    /// zero-value members are excluded so the median does not collapse to 0
    /// in a dataset where most members declare nothing.
    pub median: f64,
}

pub fn kpi_summary(records: &[Record], state: &FilterState) -> KpiSummary {
    let base = visible_records(records, state);
    let totals: Vec<f64> = base.iter().map(|r| effective_total(r, state)).collect();

    let count = base.len();
    let total: f64 = totals.iter().sum();
    let mean = if count > 0 { total / count as f64 } else { 0.0 };
    let positives: Vec<f64> = totals.iter().copied().filter(|v| *v > 0.0).collect();

    KpiSummary {
        count,
        total,
        mean,
        median: median(&positives),
    }
}

// ============================================================================
// COMPANY CATALOG & STACKS
// ============================================================================

/// One company in the picker catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyEntry {
    /// First spelling encountered, kept for display.
    pub label: String,
    /// Normalized key (the selection/matching identity).
    pub key: String,
    pub total: f64,
}

/// All public companies across the whole dataset, deduped by normalized
/// key, sorted by descending total declared value. Backs the company picker
/// and the dynamic table columns.
pub fn company_catalog(records: &[Record], state: &FilterState) -> Vec<CompanyEntry> {
    let mut map: BTreeMap<String, CompanyEntry> = BTreeMap::new();

    for record in records {
        for holding in effective_holdings(record, state) {
            if is_non_public(&holding.societe) {
                continue;
            }
            let key = normalize_key(&holding.societe);
            let entry = map.entry(key.clone()).or_insert_with(|| CompanyEntry {
                label: holding.societe.clone(),
                key,
                total: 0.0,
            });
            entry.total += holding.value();
        }
    }

    let mut catalog: Vec<CompanyEntry> = map.into_values().collect();
    catalog.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    catalog
}

/// One company row of the stacked per-group breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyStack {
    pub label: String,
    pub total: f64,
    /// Value held by members of each group, keyed by group name.
    pub by_group: BTreeMap<String, f64>,
}

/// Per-company totals broken down by group, over the visible records,
/// ordered by descending total. When a company multi-selection is active,
/// only matching companies are returned (same containment rule as the
/// record filter).
pub fn company_stacks(records: &[Record], state: &FilterState) -> Vec<CompanyStack> {
    let base = visible_records(records, state);
    // Keyed by uppercased name: spelling variants that differ only in case
    // collapse into one row, but the first label seen is displayed.
    let mut map: BTreeMap<String, CompanyStack> = BTreeMap::new();

    for record in &base {
        let group = record.group().to_string();
        for holding in effective_holdings(record, state) {
            if is_non_public(&holding.societe) {
                continue;
            }
            let key = holding.societe.to_uppercase();
            let entry = map.entry(key).or_insert_with(|| CompanyStack {
                label: holding.societe.clone(),
                total: 0.0,
                by_group: BTreeMap::new(),
            });
            entry.total += holding.value();
            *entry.by_group.entry(group.clone()).or_insert(0.0) += holding.value();
        }
    }

    let mut stacks: Vec<CompanyStack> = map.into_values().collect();
    if !state.active_companies.is_empty() {
        stacks.retain(|s| {
            let norm = normalize_key(&s.label);
            state.active_companies.iter().any(|key| norm.contains(key))
        });
    }
    stacks.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    stacks
}

// ============================================================================
// TESTS
// ============================================================================
