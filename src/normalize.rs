// String normalization, entity classification and display formatting.
// Everything here is pure and allocation-light; the aggregation engine and
// the table both route company-name comparisons through normalize_key.

// ============================================================================
// SEARCH NORMALIZATION
// ============================================================================

/// Normalize a string for company/name matching: lowercase, French accents
/// folded to ASCII, apostrophe variants and whitespace removed.
///
/// Two names refer to the same company when one normalized key contains the
/// other. This containment rule is deliberately permissive and can over-match
/// on short keys ("BNP" matches "BNP PARIBAS" but also "BNP IMMO").
pub fn normalize_key(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        match c {
            '\'' | '\u{2019}' | '\u{2018}' | '`' => continue,
            _ => {}
        }
        match fold_accent(c) {
            Some(folded) => out.push(folded),
            None => {
                for lc in c.to_lowercase() {
                    out.push(lc);
                }
            }
        }
    }
    out
}

/// Fold one French accented letter to its ASCII base, lowercased.
fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' | 'À' | 'Â' | 'Ä' | 'Á' | 'Ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'î' | 'ï' | 'í' | 'Î' | 'Ï' | 'Í' => 'i',
        'ô' | 'ö' | 'ó' | 'õ' | 'Ô' | 'Ö' | 'Ó' | 'Õ' => 'o',
        'ù' | 'û' | 'ü' | 'ú' | 'Ù' | 'Û' | 'Ü' | 'Ú' => 'u',
        'ÿ' | 'Ÿ' => 'y',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        _ => return None,
    };
    Some(folded)
}

/// Collapse whitespace runs to single spaces and trim the ends.
/// Company names in the source XML frequently carry embedded newlines.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// HOLDING CLASSIFICATION
// ============================================================================

/// A holding whose company name was withheld in the published declaration.
/// The declared value of such lines is never trusted as a real figure.
pub fn is_non_public(name: &str) -> bool {
    if name.trim().is_empty() {
        return true;
    }
    let lower = name.to_lowercase();
    lower.contains("non publi")
}

/// Legal-form abbreviations of closely-held French structures (family
/// companies, real-estate vehicles, farm holdings, employee funds).
const PRIVATE_STRUCTURE_FORMS: &[&str] = &[
    "sci", "sarl", "sas", "sasu", "snc", "scp", "selarl", "spfpl", "earl",
    "gaec", "scea", "gfa", "gfr", "fonciere", "scpi", "fcpe", "fcpi", "fcp",
];

/// Whole-word match against the private legal-form list, case-insensitive.
/// Used only to exclude non-listed vehicles from "public markets" views;
/// the unfiltered dataset always keeps these holdings.
pub fn is_private_structure(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let lower = name.to_lowercase();
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| PRIVATE_STRUCTURE_FORMS.contains(&word))
}

// ============================================================================
// DISPLAY FORMATTING
// ============================================================================

/// Short EUR rendering: 2 decimals of millions, rounded thousands, plain
/// units. Zero, negative-or-missing and NaN all render as an em dash.
/// Display only — never parsed back or compared.
pub fn format_eur(n: f64) -> String {
    if !n.is_finite() || n <= 0.0 {
        return "—".to_string();
    }
    if n >= 1e6 {
        format!("{:.2}M€", n / 1e6)
    } else if n >= 1e3 {
        format!("{}k€", (n / 1e3).round() as i64)
    } else {
        format!("{}€", n.round() as i64)
    }
}

/// Axis tick rendering: the unit is picked once from the axis maximum so all
/// ticks on one axis share a scale.
pub fn format_eur_axis(max_in_range: f64, v: f64) -> String {
    if max_in_range >= 1e6 {
        let m = v / 1e6;
        if m.fract() == 0.0 {
            format!("{}M€", m as i64)
        } else {
            format!("{:.1}M€", m)
        }
    } else if max_in_range >= 1e3 {
        format!("{}k€", (v / 1e3).round() as i64)
    } else {
        format!("{}€", v.round() as i64)
    }
}

// ============================================================================
// MEDIAN
// ============================================================================

/// Sorted-midpoint median; 0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_strips_accents_apostrophes_spaces() {
        assert_eq!(normalize_key("Crédit Agricole"), "creditagricole");
        assert_eq!(normalize_key("L'Oréal"), "loreal");
        assert_eq!(normalize_key("L\u{2019}Oréal  S.A."), "loreals.a.");
        assert_eq!(normalize_key("  TOTAL ENERGIES "), "totalenergies");
    }

    #[test]
    fn test_normalize_key_containment_matching() {
        let selected = normalize_key("L'Oréal");
        let holding = normalize_key("L OREAL SA");
        assert!(holding.contains(&selected));
    }

    #[test]
    fn test_is_non_public() {
        assert!(is_non_public(""));
        assert!(is_non_public("   "));
        assert!(is_non_public("non publié"));
        assert!(is_non_public("Non publiée"));
        assert!(is_non_public("[Non publié]"));
        assert!(!is_non_public("Sanofi"));
    }

    #[test]
    fn test_is_private_structure_whole_word() {
        assert!(is_private_structure("SCI DES LILAS"));
        assert!(is_private_structure("Boulangerie Martin SARL"));
        assert!(is_private_structure("sas du moulin"));
        assert!(is_private_structure("SASU-HOLDING"));
        // Substring inside a longer word must not match
        assert!(!is_private_structure("CASCADES INC"));
        assert!(!is_private_structure("SASUX HOLDING"));
        assert!(!is_private_structure("AIRBUS"));
        assert!(!is_private_structure(""));
    }

    #[test]
    fn test_format_eur_ranges() {
        assert_eq!(format_eur(0.0), "—");
        assert_eq!(format_eur(f64::NAN), "—");
        assert_eq!(format_eur(850.0), "850€");
        assert_eq!(format_eur(1500.0), "2k€");
        assert_eq!(format_eur(2_450_000.0), "2.45M€");
    }

    #[test]
    fn test_format_eur_axis_uses_domain_max() {
        assert_eq!(format_eur_axis(5e6, 2_000_000.0), "2M€");
        assert_eq!(format_eur_axis(5e6, 2_500_000.0), "2.5M€");
        assert_eq!(format_eur_axis(800_000.0, 250_000.0), "250k€");
        assert_eq!(format_eur_axis(500.0, 120.0), "120€");
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[7.0]), 7.0);
        assert_eq!(median(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }
}
