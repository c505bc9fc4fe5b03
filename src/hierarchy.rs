use serde::Serialize;
use std::collections::HashMap;

use crate::aggregate::{
    company_matches, effective_holdings, short_group_name, visible_records, GroupColors,
};
use crate::dataset::Record;
use crate::filter::FilterState;
use crate::normalize::is_non_public;

/// Display cap on explicit company children per legislator. Cosmetic only:
/// the legislator's own aggregate always carries the full effective total.
const MAX_COMPANY_CHILDREN: usize = 12;

/// Visibility floor for legislators with no company children, so zero-value
/// members still render as non-degenerate arcs/cells.
const LEAF_FLOOR: f64 = 1000.0;

/// Floor of the undisclosed placeholder's synthetic display value.
const PLACEHOLDER_FLOOR: f64 = 5000.0;

/// Placeholder display value when no public holding gives a reference size.
const PLACEHOLDER_DEFAULT: f64 = 10_000.0;

const COMPANY_NODE_COLOR: &str = "#6fa8bf";
const NON_PUBLIC_COLOR: &str = "#7a8a90";

// ============================================================================
// HIERARCHY (root → group → legislator → company)
// ============================================================================

/// Leaf of the hierarchy: one company position, or the collapsed
/// undisclosed-lines placeholder.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyNode {
    pub name: String,
    /// Area encoding value. For `is_estimate` nodes this is synthetic
    /// (proportional placeholder only) and MUST NOT be summed into totals
    /// or shown as a figure; tooltips say "value undisclosed" instead.
    pub value: f64,
    pub is_estimate: bool,
    /// Number of declaration lines collapsed into this node.
    pub count: usize,
    pub couleur: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityNode {
    pub name: String,
    pub url: String,
    pub groupe: String,
    pub couleur: String,
    /// Own area value: the remainder of the effective total not carried by
    /// the explicit children, or the visibility floor for childless nodes.
    /// Bottom-up summing of (value + children) then reproduces the correct
    /// proportions without double counting.
    pub value: f64,
    /// True effective total, for tooltips and drill-down headers.
    pub raw_value: f64,
    pub nb_participations: usize,
    pub children: Vec<CompanyNode>,
}

impl EntityNode {
    /// value + real children values; placeholder children excluded.
    /// Equals `raw_value` by construction.
    pub fn real_sum(&self) -> f64 {
        self.value
            + self
                .children
                .iter()
                .filter(|c| !c.is_estimate)
                .map(|c| c.value)
                .sum::<f64>()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupNode {
    pub name: String,
    pub couleur: String,
    pub children: Vec<EntityNode>,
}

impl GroupNode {
    /// Sum of the members' true effective totals.
    pub fn total(&self) -> f64 {
        self.children.iter().map(|e| e.raw_value).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Hierarchy {
    pub children: Vec<GroupNode>,
}

/// Build the 3-level tree for the hierarchical views (sunburst, treemap),
/// over the visible records narrowed by the company multi-selection.
/// Members with no effective holding are skipped entirely.
pub fn build_hierarchy(
    records: &[Record],
    state: &FilterState,
    colors: &mut GroupColors,
) -> Hierarchy {
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupNode> = Vec::new();

    for record in visible_records(records, state) {
        let holdings = effective_holdings(record, state);
        if holdings.is_empty() {
            continue;
        }
        if !company_matches(record, state) {
            continue;
        }

        let group = record.group().to_string();
        let group_color = colors.color_of(&group);

        // Top public positions by declared value, capped for display.
        let mut public: Vec<_> = holdings
            .iter()
            .filter(|p| !is_non_public(&p.societe) && p.value() > 0.0)
            .collect();
        public.sort_by(|a, b| {
            b.value()
                .partial_cmp(&a.value())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        public.truncate(MAX_COMPANY_CHILDREN);

        let mut children: Vec<CompanyNode> = public
            .iter()
            .map(|p| CompanyNode {
                name: p.societe.clone(),
                value: p.value(),
                is_estimate: false,
                count: 1,
                couleur: group_color.clone(),
            })
            .collect();

        let non_public_count = holdings.iter().filter(|p| is_non_public(&p.societe)).count();
        if non_public_count > 0 {
            let value = match public.last() {
                Some(smallest) => (smallest.value() * 0.3).max(PLACEHOLDER_FLOOR),
                None => PLACEHOLDER_DEFAULT,
            };
            let name = if non_public_count > 1 {
                format!("Non publié ×{}", non_public_count)
            } else {
                "Non publié".to_string()
            };
            children.push(CompanyNode {
                name,
                value,
                is_estimate: true,
                count: non_public_count,
                couleur: NON_PUBLIC_COLOR.to_string(),
            });
        }

        let effective_total: f64 = holdings.iter().map(|p| p.value()).sum();
        let public_sum: f64 = children
            .iter()
            .filter(|c| !c.is_estimate)
            .map(|c| c.value)
            .sum();

        // Remainder when children exist (placeholder display values never
        // count), visibility floor otherwise.
        let own_value = if children.is_empty() {
            effective_total.max(LEAF_FLOOR)
        } else {
            (effective_total - public_sum).max(0.0)
        };

        let entity = EntityNode {
            name: record.display_name(),
            url: record.url.clone(),
            groupe: group.clone(),
            couleur: group_color.clone(),
            value: own_value,
            raw_value: effective_total,
            nb_participations: holdings.len(),
            children,
        };

        let idx = *group_index.entry(group.clone()).or_insert_with(|| {
            groups.push(GroupNode {
                name: group.clone(),
                couleur: group_color.clone(),
                children: Vec::new(),
            });
            groups.len() - 1
        });
        groups[idx].children.push(entity);
    }

    Hierarchy { children: groups }
}

// ============================================================================
// SANKEY (group → legislator → company flows)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SankeyNodeKind {
    Groupe,
    Depute,
    Societe,
}

#[derive(Debug, Clone, Serialize)]
pub struct SankeyNode {
    pub kind: SankeyNodeKind,
    /// Stable identity for click-through: full group name, record url, or
    /// uppercased company key.
    pub id: String,
    pub label: String,
    pub couleur: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SankeyLink {
    /// Index into `nodes`.
    pub source: usize,
    pub target: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SankeyGraph {
    pub nodes: Vec<SankeyNode>,
    pub links: Vec<SankeyLink>,
}

/// Knobs of the flow view: keep only the `top_n` companies by total, and
/// only holdings inside the [min_value, max_value] window.
#[derive(Debug, Clone, Copy)]
pub struct SankeyOptions {
    pub top_n: usize,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for SankeyOptions {
    fn default() -> Self {
        Self {
            top_n: usize::MAX,
            min_value: 0.0,
            max_value: f64::INFINITY,
        }
    }
}

/// Build the group → legislator → company flow graph over the visible
/// records (company multi-selection applied). Non-public and zero-value
/// holdings never appear; parallel flows merge by summing. Returns an
/// empty, well-formed graph when nothing passes the window.
pub fn build_sankey(
    records: &[Record],
    state: &FilterState,
    colors: &mut GroupColors,
    options: SankeyOptions,
) -> SankeyGraph {
    let source: Vec<&Record> = visible_records(records, state)
        .into_iter()
        .filter(|r| company_matches(r, state))
        .collect();

    let in_window = |value: f64| -> bool {
        value > 0.0 && value >= options.min_value && value <= options.max_value
    };

    // Company totals first, to pick the top N.
    let mut company_totals: HashMap<String, f64> = HashMap::new();
    for record in &source {
        for holding in effective_holdings(record, state) {
            if is_non_public(&holding.societe) || !in_window(holding.value()) {
                continue;
            }
            *company_totals
                .entry(holding.societe.to_uppercase())
                .or_insert(0.0) += holding.value();
        }
    }

    let mut ranked: Vec<(&String, &f64)> = company_totals.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    let top_set: std::collections::HashSet<&str> = ranked
        .iter()
        .take(options.top_n)
        .map(|(key, _)| key.as_str())
        .collect();

    let mut graph = SankeyGraph::default();
    let mut node_index: HashMap<String, usize> = HashMap::new();
    let mut link_index: HashMap<(usize, usize), usize> = HashMap::new();

    fn intern(
        graph: &mut SankeyGraph,
        node_index: &mut HashMap<String, usize>,
        kind: SankeyNodeKind,
        id: &str,
        label: String,
        couleur: String,
    ) -> usize {
        let full_id = format!("{:?}::{}", kind, id);
        *node_index.entry(full_id).or_insert_with(|| {
            graph.nodes.push(SankeyNode {
                kind,
                id: id.to_string(),
                label,
                couleur,
            });
            graph.nodes.len() - 1
        })
    }

    for record in &source {
        let group = record.group().to_string();
        let group_color = colors.color_of(&group);

        for holding in effective_holdings(record, state) {
            if is_non_public(&holding.societe) || !in_window(holding.value()) {
                continue;
            }
            let company_key = holding.societe.to_uppercase();
            if !top_set.contains(company_key.as_str()) {
                continue;
            }

            let g = intern(
                &mut graph,
                &mut node_index,
                SankeyNodeKind::Groupe,
                &group,
                short_group_name(&group, &record.groupe_sigle).to_string(),
                group_color.clone(),
            );
            let d = intern(
                &mut graph,
                &mut node_index,
                SankeyNodeKind::Depute,
                &record.url,
                record.display_name(),
                group_color.clone(),
            );
            let s = intern(
                &mut graph,
                &mut node_index,
                SankeyNodeKind::Societe,
                &company_key,
                holding.societe.clone(),
                COMPANY_NODE_COLOR.to_string(),
            );

            for (from, to) in [(g, d), (d, s)] {
                match link_index.get(&(from, to)) {
                    Some(&i) => graph.links[i].value += holding.value(),
                    None => {
                        link_index.insert((from, to), graph.links.len());
                        graph.links.push(SankeyLink {
                            source: from,
                            target: to,
                            value: holding.value(),
                        });
                    }
                }
            }
        }
    }

    graph
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Holding;

    fn record(url: &str, groupe: &str, holdings: &[(&str, f64)]) -> Record {
        let mut r = Record {
            prenom: "Test".into(),
            nom: url.trim_start_matches('/').to_uppercase(),
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

    fn entity<'a>(tree: &'a Hierarchy, url: &str) -> &'a EntityNode {
        tree.children
            .iter()
            .flat_map(|g| g.children.iter())
            .find(|e| e.url == url)
            .unwrap()
    }

    #[test]
    fn test_remainder_construction_is_exact() {
        let records = vec![record(
            "/a",
            "X",
            &[("Acme", 8000.0), ("Globex", 2000.0)],
        )];
        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);

        let node = entity(&tree, "/a");
        assert_eq!(node.raw_value, 10_000.0);
        assert_eq!(node.children.len(), 2);
        // value + children == effective total, exactly
        assert!((node.real_sum() - node.raw_value).abs() < 1e-9);
        assert_eq!(node.value, 0.0);
    }

    #[test]
    fn test_display_cap_keeps_full_total() {
        let holdings: Vec<(String, f64)> = (0..15)
            .map(|i| (format!("Société {}", i), 1000.0 * (i + 1) as f64))
            .collect();
        let holdings_ref: Vec<(&str, f64)> =
            holdings.iter().map(|(n, v)| (n.as_str(), *v)).collect();
        let records = vec![record("/a", "X", &holdings_ref)];

        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        let node = entity(&tree, "/a");

        assert_eq!(node.children.len(), MAX_COMPANY_CHILDREN);
        let full_total: f64 = (1..=15).map(|i| 1000.0 * i as f64).sum();
        assert_eq!(node.raw_value, full_total);
        // The 3 smallest positions survive as the node's own remainder.
        assert_eq!(node.value, 1000.0 + 2000.0 + 3000.0);
        assert!((node.real_sum() - full_total).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_value_is_synthetic_and_excluded() {
        let records = vec![record(
            "/a",
            "X",
            &[("Acme", 100_000.0), ("non publié", 0.0), ("non publié", 0.0)],
        )];
        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        let node = entity(&tree, "/a");

        let placeholder = node.children.iter().find(|c| c.is_estimate).unwrap();
        assert_eq!(placeholder.name, "Non publié ×2");
        assert_eq!(placeholder.count, 2);
        assert_eq!(placeholder.value, 30_000.0); // 0.3 × smallest public
        // Placeholder never counts toward the real total
        assert_eq!(node.raw_value, 100_000.0);
        assert!((node.real_sum() - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_floor_and_default() {
        // Small public reference → floor wins
        let records = vec![record("/a", "X", &[("Acme", 2000.0), ("non publié", 0.0)])];
        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        let placeholder = entity(&tree, "/a")
            .children
            .iter()
            .find(|c| c.is_estimate)
            .unwrap();
        assert_eq!(placeholder.value, PLACEHOLDER_FLOOR);

        // No public reference at all → fixed default
        let records = vec![record("/b", "X", &[("non publié", 0.0)])];
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        let node = entity(&tree, "/b");
        let placeholder = node.children.iter().find(|c| c.is_estimate).unwrap();
        assert_eq!(placeholder.value, PLACEHOLDER_DEFAULT);
        // Only child is the placeholder: own value carries the whole
        // (zero) effective total, excluded from the child sum.
        assert_eq!(node.raw_value, 0.0);
        assert_eq!(node.value, 0.0);
    }

    #[test]
    fn test_childless_entity_gets_visibility_floor() {
        // One zero-value disclosed line: no child (value must be > 0),
        // no placeholder, so the floor applies.
        let records = vec![record("/a", "X", &[("Acme", 0.0)])];
        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        let node = entity(&tree, "/a");
        assert!(node.children.is_empty());
        assert_eq!(node.value, LEAF_FLOOR);
        assert_eq!(node.raw_value, 0.0);
    }

    #[test]
    fn test_members_without_holdings_are_skipped() {
        let records = vec![
            record("/a", "X", &[("Acme", 1000.0)]),
            record("/b", "X", &[]),
        ];
        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &FilterState::default(), &mut colors);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);
        assert_eq!(tree.children[0].children[0].url, "/a");
    }

    #[test]
    fn test_company_filter_narrows_hierarchy() {
        let records = vec![
            record("/a", "X", &[("Acme", 1000.0)]),
            record("/c", "Y", &[("Acme", 500.0), ("non publié", 0.0)]),
            record("/d", "Y", &[("Globex", 700.0)]),
        ];
        let mut state = FilterState::default();
        state.toggle_company(&crate::normalize::normalize_key("Acme"));

        let mut colors = GroupColors::default();
        let tree = build_hierarchy(&records, &state, &mut colors);
        let urls: Vec<&str> = tree
            .children
            .iter()
            .flat_map(|g| g.children.iter())
            .map(|e| e.url.as_str())
            .collect();
        assert_eq!(urls, ["/a", "/c"]);
    }

    #[test]
    fn test_sankey_links_conserve_value() {
        let records = vec![
            record("/a", "X", &[("Acme", 1000.0), ("Globex", 400.0)]),
            record("/b", "X", &[("Acme", 600.0)]),
            record("/c", "Y", &[("Acme", 500.0), ("non publié", 0.0)]),
        ];
        let mut colors = GroupColors::default();
        let graph = build_sankey(
            &records,
            &FilterState::default(),
            &mut colors,
            SankeyOptions::default(),
        );

        let sum_kind = |kind: SankeyNodeKind| -> f64 {
            graph
                .links
                .iter()
                .filter(|l| graph.nodes[l.source].kind == kind)
                .map(|l| l.value)
                .sum()
        };
        // Group→legislator and legislator→company stages carry the same flow
        assert!((sum_kind(SankeyNodeKind::Groupe) - sum_kind(SankeyNodeKind::Depute)).abs() < 1e-9);
        assert_eq!(sum_kind(SankeyNodeKind::Groupe), 2500.0);

        // Non-public lines never become nodes
        assert!(graph
            .nodes
            .iter()
            .all(|n| n.kind != SankeyNodeKind::Societe || !n.label.contains("publié")));
    }

    #[test]
    fn test_sankey_top_n_and_value_window() {
        let records = vec![record(
            "/a",
            "X",
            &[("Acme", 10_000.0), ("Globex", 5000.0), ("Initech", 50.0)],
        )];
        let mut colors = GroupColors::default();

        let graph = build_sankey(
            &records,
            &FilterState::default(),
            &mut colors,
            SankeyOptions {
                top_n: 1,
                ..SankeyOptions::default()
            },
        );
        let companies: Vec<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.kind == SankeyNodeKind::Societe)
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(companies, ["Acme"]);

        let graph = build_sankey(
            &records,
            &FilterState::default(),
            &mut colors,
            SankeyOptions {
                min_value: 100.0,
                max_value: 6000.0,
                ..SankeyOptions::default()
            },
        );
        let companies: Vec<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.kind == SankeyNodeKind::Societe)
            .map(|n| n.label.as_str())
            .collect();
        assert_eq!(companies, ["Globex"]);
    }

    #[test]
    fn test_sankey_empty_is_well_formed() {
        let records = vec![record("/a", "X", &[("Acme", 10.0)])];
        let mut colors = GroupColors::default();
        let graph = build_sankey(
            &records,
            &FilterState::default(),
            &mut colors,
            SankeyOptions {
                min_value: 1_000_000.0,
                ..SankeyOptions::default()
            },
        );
        assert!(graph.nodes.is_empty());
        assert!(graph.links.is_empty());
    }

    #[test]
    fn test_merged_parallel_links() {
        // Two holdings of the same legislator in the same company merge
        // into one legislator→company link.
        let records = vec![record("/a", "X", &[("Acme SA", 100.0), ("ACME SA", 200.0)])];
        let mut colors = GroupColors::default();
        let graph = build_sankey(
            &records,
            &FilterState::default(),
            &mut colors,
            SankeyOptions::default(),
        );
        assert_eq!(graph.links.len(), 2); // group→dep and dep→company
        assert!(graph.links.iter().all(|l| l.value == 300.0));
    }
}
