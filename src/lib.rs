// HATVP participations dashboard - Core Library
// Exposes the aggregation core for use in the TUI, the API server and tests

pub mod aggregate;
pub mod dataset;
pub mod filter;
pub mod hierarchy;
pub mod normalize;
pub mod table;

// Terminal dashboard, compiled only with the TUI feature
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use aggregate::{
    aggregate_by_group, company_catalog, company_matches, company_stacks, company_value,
    effective_holdings, effective_total, kpi_summary, short_group_name, visible_records,
    CompanyEntry, CompanyStack, GroupAggregate, GroupColors, KpiSummary, FALLBACK_COLORS,
};
pub use dataset::{
    decode_html_entities, fingerprint, load_dataset, Chamber, Dataset, DatasetInfo, Holding,
    Record, UNKNOWN_GROUP,
};
pub use filter::{distinct_groups, FilterState};
pub use hierarchy::{
    build_hierarchy, build_sankey, CompanyNode, EntityNode, GroupNode, Hierarchy, SankeyGraph,
    SankeyLink, SankeyNode, SankeyNodeKind, SankeyOptions,
};
pub use normalize::{
    format_eur, format_eur_axis, is_non_public, is_private_structure, median, normalize_key,
};
pub use table::{
    export_csv, filter_rows, page_count, page_slice, row_view, sort_rows, RowView, SortKey,
    TableState, PAGE_SIZE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
