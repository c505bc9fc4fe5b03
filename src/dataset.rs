use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::normalize::collapse_whitespace;

/// Sentinel group for records the scraper could not attach to a group.
pub const UNKNOWN_GROUP: &str = "Inconnu";

/// Manual group fixups, keyed by record url. The upstream registry match
/// fails on a handful of names (Unicode apostrophes in the source pages).
const GROUP_OVERRIDES: &[(&str, &str)] = &[(
    "/pages_nominatives/d-intorni-christelle-20430",
    "Union des droites pour la République",
)];

// ============================================================================
// MODEL
// ============================================================================

/// One declared equity line of a declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Holding {
    /// Company name as published; the literal "non publié" when withheld.
    pub societe: String,

    /// Declared value in EUR; 0 when absent or withheld.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub evaluation: f64,

    /// Declared number of shares. Detail display only, never aggregated.
    #[serde(default, rename = "nbParts", deserialize_with = "lenient_f64")]
    pub nb_parts: f64,

    /// Declared remuneration from the position. Detail display only.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub remuneration: f64,
}

impl Holding {
    /// Declared value with NaN/infinite guarded to zero, the only form the
    /// aggregation engine is allowed to sum.
    pub fn value(&self) -> f64 {
        if self.evaluation.is_finite() {
            self.evaluation
        } else {
            0.0
        }
    }
}

/// One legislator with a published interest declaration.
///
/// Core fields come straight from the fetched dataset; the derived fields at
/// the bottom are computed once at load time and never mutated afterwards.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Record {
    pub prenom: String,
    pub nom: String,

    /// Declaration page path on hatvp.fr — the unique record key.
    pub url: String,

    #[serde(default)]
    pub qualite: String,

    #[serde(default)]
    pub departement: String,

    /// Full political-group name; empty input is normalized to "Inconnu".
    #[serde(default)]
    pub groupe: String,

    /// Short group label from the source registry (may be empty).
    #[serde(default)]
    pub groupe_sigle: String,

    /// Hex color supplied by the source registry for the group, or "".
    #[serde(default)]
    pub couleur_groupe: String,

    #[serde(default)]
    pub participations: Vec<Holding>,

    /// Derived: number of declared participations.
    #[serde(default, skip_deserializing)]
    pub nb_participations: usize,

    /// Derived: sum of all declared values (undisclosed lines count as 0).
    #[serde(default, skip_deserializing)]
    pub valeur_totale: f64,
}

impl Record {
    /// "Prénom NOM" as shown everywhere in the UI.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.prenom, self.nom)
    }

    /// Group name with the missing-group sentinel applied.
    pub fn group(&self) -> &str {
        if self.groupe.is_empty() {
            UNKNOWN_GROUP
        } else {
            &self.groupe
        }
    }

    /// Normalize source quirks and compute the cached derived fields.
    /// Called once per record at load; records are read-only afterwards.
    pub fn finalize(&mut self) {
        self.groupe = decode_html_entities(&self.groupe);
        if self.groupe.trim().is_empty() {
            self.groupe = UNKNOWN_GROUP.to_string();
        }
        for p in &mut self.participations {
            p.societe = collapse_whitespace(&p.societe);
        }
        self.nb_participations = self.participations.len();
        self.valeur_totale = self.participations.iter().map(Holding::value).sum();
    }
}

/// Accept numbers, numeric strings, or junk; junk becomes 0 rather than a
/// load failure (a single malformed line must not reject the dataset).
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Decode the HTML entities the scraper leaves in group names
/// (named subset seen in the wild + decimal numeric references).
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '&' {
            out.push(c);
            continue;
        }
        let rest = &text[i..];
        let entity_end = rest.find(';').filter(|&e| e <= 10);
        let Some(end) = entity_end else {
            out.push(c);
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| num.parse::<u32>().ok())
                .and_then(char::from_u32),
        };
        match decoded {
            Some(d) => {
                out.push(d);
                // Skip the entity body we just consumed.
                for _ in 0..end {
                    chars.next();
                }
            }
            None => out.push(c),
        }
    }
    out
}

// ============================================================================
// CHAMBERS & LOADING
// ============================================================================

/// Which legislature a dataset covers. The two chambers have disjoint group
/// sets, so switching resets every filter and the color cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    Deputes,
    Senateurs,
}

impl Chamber {
    pub fn title(&self) -> &'static str {
        match self {
            Chamber::Deputes => "Assemblée Nationale",
            Chamber::Senateurs => "Sénat",
        }
    }

    /// Singular member word, for counters and tooltips.
    pub fn member_word(&self) -> &'static str {
        match self {
            Chamber::Deputes => "député",
            Chamber::Senateurs => "sénateur",
        }
    }
}

impl std::fmt::Display for Chamber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chamber::Deputes => write!(f, "deputes"),
            Chamber::Senateurs => write!(f, "senateurs"),
        }
    }
}

/// Provenance of one loaded dataset file.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub path: String,
    pub records: usize,
    pub participations: usize,
    /// SHA-256 of the raw file bytes, for display and change detection.
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

/// One chamber's records plus load provenance.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub chamber: Chamber,
    pub records: Vec<Record>,
    pub info: DatasetInfo,
}

/// Hex SHA-256 of a byte slice.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Load a dataset file (the JSON array written by the fetcher), apply the
/// load-time normalizations and derive the cached per-record totals.
pub fn load_dataset(path: &Path, chamber: Chamber) -> Result<Dataset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read dataset file {}", path.display()))?;
    let hash = fingerprint(&bytes);

    let mut records: Vec<Record> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse dataset JSON {}", path.display()))?;

    for record in &mut records {
        record.finalize();
        if let Some((_, group)) = GROUP_OVERRIDES.iter().find(|(url, _)| *url == record.url) {
            record.groupe = (*group).to_string();
        }
    }

    let participations = records.iter().map(|r| r.participations.len()).sum();
    let info = DatasetInfo {
        path: path.display().to_string(),
        records: records.len(),
        participations,
        fingerprint: hash,
        loaded_at: Utc::now(),
    };

    Ok(Dataset {
        chamber,
        records,
        info,
    })
}

// ============================================================================
// TESTS
// ============================================================================
