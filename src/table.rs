use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::Write;

use crate::aggregate::{company_matches, company_value, effective_holdings, visible_records};
use crate::dataset::Record;
use crate::filter::FilterState;
use crate::normalize::is_non_public;

/// Fixed table page size.
pub const PAGE_SIZE: usize = 30;

/// How many public positions the "principales sociétés" cell shows.
const TOP_COMPANIES_PER_ROW: usize = 4;

// ============================================================================
// SORT KEYS
// ============================================================================

/// What the table is ordered by. `Societe` keys carry the normalized
/// company key; the sort value is then the record's summed effective value
/// in that company, computed per sort rather than stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    Nom,
    Groupe,
    Departement,
    NbParts,
    ValeurTotale,
    Societe(String),
    /// Unrecognized key: every row compares equal, so the incoming order
    /// is kept (stable sort) instead of erroring.
    Aucun,
}

impl SortKey {
    /// Parse the wire form used by the API and the original table header
    /// ids ("nom", "valeurTotale", "soc:<normalized-key>", ...).
    pub fn parse(text: &str) -> SortKey {
        match text {
            "nom" => SortKey::Nom,
            "groupe" => SortKey::Groupe,
            "departement" => SortKey::Departement,
            "nbParts" => SortKey::NbParts,
            "valeurTotale" => SortKey::ValeurTotale,
            _ => match text.strip_prefix("soc:") {
                Some(key) if !key.is_empty() => SortKey::Societe(key.to_string()),
                _ => SortKey::Aucun,
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            SortKey::Nom => "Nom".to_string(),
            SortKey::Groupe => "Groupe".to_string(),
            SortKey::Departement => "Département".to_string(),
            SortKey::NbParts => "Participations".to_string(),
            SortKey::ValeurTotale => "Valeur totale".to_string(),
            SortKey::Societe(key) => format!("Société {}", key),
            SortKey::Aucun => "—".to_string(),
        }
    }
}

// ============================================================================
// TABLE STATE
// ============================================================================

/// Sort + pagination state of the detail table. Separate from FilterState:
/// filters define WHICH rows, this defines their order and the visible
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    pub sort_key: SortKey,
    pub descending: bool,
    /// 1-based current page.
    pub page: usize,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            sort_key: SortKey::ValeurTotale,
            descending: true,
            page: 1,
        }
    }
}

impl TableState {
    /// Header-click semantics: same key toggles direction, a new key
    /// starts descending. Either way the view jumps back to page 1.
    pub fn sort_by(&mut self, key: SortKey) {
        if self.sort_key == key {
            self.descending = !self.descending;
        } else {
            self.sort_key = key;
            self.descending = true;
        }
        self.page = 1;
    }

    /// Keep the sort coupled to the company multi-selection: selecting
    /// companies switches to the first selected company's value column
    /// (descending); clearing them returns to the default total-value sort.
    pub fn sync_company_sort(&mut self, state: &FilterState) {
        match state.active_companies.iter().next() {
            Some(first) => {
                self.sort_key = SortKey::Societe(first.clone());
                self.descending = true;
            }
            None => {
                self.sort_key = SortKey::ValeurTotale;
                self.descending = true;
            }
        }
        self.page = 1;
    }

    pub fn reset_page(&mut self) {
        self.page = 1;
    }

    /// Reset to page 1 when the current page fell off the end of a newly
    /// filtered row set.
    pub fn clamp_page(&mut self, total_rows: usize) {
        if self.page > page_count(total_rows) {
            self.page = 1;
        }
    }
}

pub fn page_count(total_rows: usize) -> usize {
    total_rows.div_ceil(PAGE_SIZE).max(1)
}

/// Rows of the current page.
pub fn page_slice<'a, 'r>(rows: &'a [&'r Record], page: usize) -> &'a [&'r Record] {
    let start = (page.saturating_sub(1)) * PAGE_SIZE;
    if start >= rows.len() {
        return &[];
    }
    let end = (start + PAGE_SIZE).min(rows.len());
    &rows[start..end]
}

// ============================================================================
// FILTER + SORT
// ============================================================================

/// The table's row set: visible records further narrowed by the text
/// search (legislator or company name, case-insensitive) and the company
/// multi-selection.
pub fn filter_rows<'a>(records: &'a [Record], state: &FilterState) -> Vec<&'a Record> {
    let query = state.search.to_lowercase();
    visible_records(records, state)
        .into_iter()
        .filter(|r| company_matches(r, state))
        .filter(|r| {
            if query.is_empty() {
                return true;
            }
            r.nom.to_lowercase().contains(&query)
                || r.prenom.to_lowercase().contains(&query)
                || effective_holdings(r, state)
                    .iter()
                    .any(|p| p.societe.to_lowercase().contains(&query))
        })
        .collect()
}

/// Stable sort of the row set under the table state.
pub fn sort_rows(rows: &mut [&Record], table: &TableState, state: &FilterState) {
    let compare = |a: &&Record, b: &&Record| -> Ordering {
        match &table.sort_key {
            SortKey::Nom => cmp_str(&a.nom, &b.nom),
            SortKey::Groupe => cmp_str(a.group(), b.group()),
            SortKey::Departement => cmp_str(&a.departement, &b.departement),
            SortKey::NbParts => a.nb_participations.cmp(&b.nb_participations),
            SortKey::ValeurTotale => cmp_f64(a.valeur_totale, b.valeur_totale),
            SortKey::Societe(key) => {
                cmp_f64(company_value(a, state, key), company_value(b, state, key))
            }
            SortKey::Aucun => Ordering::Equal,
        }
    };
    if table.descending {
        rows.sort_by(|a, b| compare(b, a));
    } else {
        rows.sort_by(compare);
    }
}

fn cmp_str(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

// ============================================================================
// ROW VIEW
// ============================================================================

/// Everything one rendered table row needs, computed once per row.
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub nom: String,
    pub url: String,
    pub groupe: String,
    pub departement: String,
    pub qualite: String,
    pub nb_participations: usize,
    pub valeur_totale: f64,
    /// Top public positions by value (display cell when no company is
    /// selected).
    pub top_societes: Vec<String>,
    /// Undisclosed lines in the raw declaration.
    pub non_public_count: usize,
    /// One value per selected company, in the selection's iteration order
    /// (the dynamic columns when companies are selected).
    pub company_values: Vec<f64>,
}

pub fn row_view(record: &Record, state: &FilterState) -> RowView {
    let mut holdings = effective_holdings(record, state);
    holdings.sort_by(|a, b| cmp_f64(b.value(), a.value()));

    let top_societes: Vec<String> = holdings
        .iter()
        .filter(|p| !is_non_public(&p.societe))
        .take(TOP_COMPANIES_PER_ROW)
        .map(|p| p.societe.clone())
        .collect();

    let non_public_count = record
        .participations
        .iter()
        .filter(|p| is_non_public(&p.societe))
        .count();

    let company_values = state
        .active_companies
        .iter()
        .map(|key| company_value(record, state, key))
        .collect();

    RowView {
        nom: record.display_name(),
        url: record.url.clone(),
        groupe: record.group().to_string(),
        departement: record.departement.clone(),
        qualite: record.qualite.clone(),
        nb_participations: record.nb_participations,
        valeur_totale: record.valeur_totale,
        top_societes,
        non_public_count,
        company_values,
    }
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Write the full filtered+sorted row set (all pages) as CSV. The dynamic
/// company columns mirror the on-screen table.
pub fn export_csv<W: Write>(writer: W, rows: &[&Record], state: &FilterState) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![
        "prenom".to_string(),
        "nom".to_string(),
        "groupe".to_string(),
        "departement".to_string(),
        "qualite".to_string(),
        "nb_participations".to_string(),
        "valeur_totale".to_string(),
    ];
    for key in &state.active_companies {
        header.push(format!("valeur_{}", key));
    }
    header.push("url".to_string());
    csv_writer
        .write_record(&header)
        .context("Failed to write CSV header")?;

    for record in rows {
        let mut fields = vec![
            record.prenom.clone(),
            record.nom.clone(),
            record.group().to_string(),
            record.departement.clone(),
            record.qualite.clone(),
            record.nb_participations.to_string(),
            format!("{:.0}", record.valeur_totale),
        ];
        for key in &state.active_companies {
            fields.push(format!("{:.0}", company_value(record, state, key)));
        }
        fields.push(record.url.clone());
        csv_writer
            .write_record(&fields)
            .context("Failed to write CSV row")?;
    }

    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Holding;
    use crate::normalize::normalize_key;

    fn record(url: &str, nom: &str, groupe: &str, holdings: &[(&str, f64)]) -> Record {
        let mut r = Record {
            prenom: "Test".into(),
            nom: nom.into(),
            url: url.into(),
            groupe: groupe.into(),
            participations: holdings
                .iter()
                .map(|(societe, evaluation)| Holding {
                    societe: societe.to_string(),
                    evaluation: *evaluation,
                    ..Holding::default()
                })
                .collect(),
            ..Record::default()
        };
        r.finalize();
        r
    }

    fn sample_records() -> Vec<Record> {
        vec![
            record("/a", "ALPHA", "X", &[("Acme", 1000.0)]),
            record("/b", "BETA", "X", &[]),
            record(
                "/c",
                "GAMMA",
                "Y",
                &[("Acme", 500.0), ("Globex", 9000.0), ("non publié", 0.0)],
            ),
        ]
    }

    #[test]
    fn test_sort_by_company_key_missing_sorts_as_zero() {
        let records = sample_records();
        let state = FilterState::default();
        let table = TableState {
            sort_key: SortKey::Societe(normalize_key("Acme")),
            descending: true,
            page: 1,
        };

        let mut rows = filter_rows(&records, &state);
        sort_rows(&mut rows, &table, &state);
        let urls: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["/a", "/c", "/b"]);
    }

    #[test]
    fn test_sort_direction_toggles_on_same_key_only() {
        let mut table = TableState::default();
        assert!(table.descending);

        table.sort_by(SortKey::ValeurTotale);
        assert!(!table.descending); // same key: toggled

        table.sort_by(SortKey::Nom);
        assert!(table.descending); // new key: back to descending
        assert_eq!(table.sort_key, SortKey::Nom);
    }

    #[test]
    fn test_company_selection_switches_sort() {
        let mut state = FilterState::default();
        let mut table = TableState::default();
        table.page = 3;

        state.toggle_company("acme");
        table.sync_company_sort(&state);
        assert_eq!(table.sort_key, SortKey::Societe("acme".into()));
        assert!(table.descending);
        assert_eq!(table.page, 1);

        state.toggle_company("acme");
        table.sync_company_sort(&state);
        assert_eq!(table.sort_key, SortKey::ValeurTotale);
    }

    #[test]
    fn test_unknown_sort_key_keeps_incoming_order() {
        let records = sample_records();
        let state = FilterState::default();
        let table = TableState {
            sort_key: SortKey::parse("mystery"),
            descending: true,
            page: 1,
        };
        assert_eq!(table.sort_key, SortKey::Aucun);

        let mut rows = filter_rows(&records, &state);
        let before: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        sort_rows(&mut rows, &table, &state);
        let after: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_parse_sort_keys() {
        assert_eq!(SortKey::parse("valeurTotale"), SortKey::ValeurTotale);
        assert_eq!(SortKey::parse("nbParts"), SortKey::NbParts);
        assert_eq!(
            SortKey::parse("soc:acme"),
            SortKey::Societe("acme".to_string())
        );
        assert_eq!(SortKey::parse("soc:"), SortKey::Aucun);
    }

    #[test]
    fn test_search_matches_names_and_companies() {
        let records = sample_records();
        let mut state = FilterState::default();

        state.set_search("globex");
        let urls: Vec<&str> = filter_rows(&records, &state)
            .iter()
            .map(|r| r.url.as_str())
            .collect();
        assert_eq!(urls, ["/c"]);

        state.set_search("ALPHA");
        let urls: Vec<&str> = filter_rows(&records, &state)
            .iter()
            .map(|r| r.url.as_str())
            .collect();
        assert_eq!(urls, ["/a"]);
    }

    #[test]
    fn test_company_filter_excludes_records_without_match() {
        let records = sample_records();
        let mut state = FilterState::default();
        state.toggle_company(&normalize_key("Acme"));

        let urls: Vec<&str> = filter_rows(&records, &state)
            .iter()
            .map(|r| r.url.as_str())
            .collect();
        assert_eq!(urls, ["/a", "/c"]); // B has no holdings at all
    }

    #[test]
    fn test_pagination_clamps_to_first_page() {
        let mut table = TableState::default();
        table.page = 5;
        table.clamp_page(31); // 2 pages
        assert_eq!(table.page, 1);

        table.page = 2;
        table.clamp_page(31);
        assert_eq!(table.page, 2);

        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(30), 1);
        assert_eq!(page_count(31), 2);
    }

    #[test]
    fn test_page_slice_bounds() {
        let records: Vec<Record> = (0..45)
            .map(|i| record(&format!("/{}", i), "NOM", "X", &[]))
            .collect();
        let rows: Vec<&Record> = records.iter().collect();

        assert_eq!(page_slice(&rows, 1).len(), 30);
        assert_eq!(page_slice(&rows, 2).len(), 15);
        assert!(page_slice(&rows, 3).is_empty());
    }

    #[test]
    fn test_row_view_top_companies_and_non_public_marker() {
        let records = sample_records();
        let state = FilterState::default();
        let view = row_view(&records[2], &state);

        assert_eq!(view.top_societes, ["Globex", "Acme"]);
        assert_eq!(view.non_public_count, 1);
        assert_eq!(view.nb_participations, 3);
        assert_eq!(view.valeur_totale, 9500.0);
    }

    #[test]
    fn test_row_view_dynamic_company_columns() {
        let records = sample_records();
        let mut state = FilterState::default();
        state.toggle_company(&normalize_key("Acme"));
        state.toggle_company(&normalize_key("Globex"));

        let view = row_view(&records[2], &state);
        // BTreeSet order: "acme" then "globex"
        assert_eq!(view.company_values, [500.0, 9000.0]);
    }

    #[test]
    fn test_export_csv_covers_all_filtered_rows() {
        let records = sample_records();
        let mut state = FilterState::default();
        state.toggle_company(&normalize_key("Acme"));

        let mut rows = filter_rows(&records, &state);
        let table = TableState::default();
        sort_rows(&mut rows, &table, &state);

        let mut out = Vec::new();
        export_csv(&mut out, &rows, &state).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 1 + rows.len());
        assert!(lines[0].contains("valeur_acme"));
        assert!(lines[1].contains("GAMMA") || lines[1].contains("ALPHA"));
    }
}
