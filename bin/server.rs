// Participations dashboard - JSON API server
// Read-only query surface over the in-memory datasets; every endpoint takes
// the filter as query-string parameters, so requests are stateless.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use hatvp_dashboard::{
    aggregate_by_group, build_hierarchy, build_sankey, company_catalog, company_stacks,
    filter_rows, kpi_summary, normalize_key, row_view, sort_rows, visible_records, Chamber,
    Dataset, DatasetInfo, FilterState, GroupColors, Record, RowView, SankeyOptions, SortKey,
    TableState, VERSION,
};

/// Shared application state
struct ServerState {
    datasets: Vec<Dataset>,
    colors: Mutex<GroupColors>,
    started_at: DateTime<Utc>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
    datasets: Vec<DatasetHealth>,
}

#[derive(Serialize)]
struct DatasetHealth {
    chamber: Chamber,
    #[serde(flatten)]
    info: DatasetInfo,
}

// ============================================================================
// Query-parameter parsing
// ============================================================================

/// Parsed request context: which dataset, which filter, which sort.
struct RequestView<'a> {
    dataset: &'a Dataset,
    state: FilterState,
    table: TableState,
    sankey: SankeyOptions,
}

/// Build the per-request view from repeatable query parameters.
/// Unknown keys are ignored; `entity` takes precedence over `group`,
/// matching the single-active-axis rule of the filter state.
fn parse_request<'a>(server: &'a ServerState, params: &[(String, String)]) -> RequestView<'a> {
    let mut dataset = &server.datasets[0];
    for (key, value) in params {
        if key == "chamber" {
            if let Some(found) = server
                .datasets
                .iter()
                .find(|d| d.chamber.to_string() == *value)
            {
                dataset = found;
            }
        }
    }

    let records = &dataset.records;
    let mut state = FilterState::default();
    let mut table = TableState::default();
    let mut sankey = SankeyOptions::default();
    let mut group_param: Option<String> = None;
    let mut entity_param: Option<String> = None;

    for (key, value) in params {
        match key.as_str() {
            "exclude" => {
                state.excluded_groups.insert(value.clone());
            }
            "company" => {
                state.active_companies.insert(normalize_key(value));
            }
            "public_only" => state.set_public_only(value == "1" || value == "true"),
            "q" => state.set_search(value),
            "group" => group_param = Some(value.clone()),
            "entity" => entity_param = Some(value.clone()),
            "sort" => table.sort_key = SortKey::parse(value),
            "dir" => table.descending = value != "asc",
            "top" => sankey.top_n = value.parse().unwrap_or(usize::MAX),
            "min" => sankey.min_value = value.parse().unwrap_or(0.0),
            "max" => sankey.max_value = value.parse().unwrap_or(f64::INFINITY),
            _ => {}
        }
    }

    // The single-axis selections last: they rewrite the exclusion set.
    if let Some(group) = &group_param {
        state.select_group(records, Some(group));
    }
    if let Some(entity) = &entity_param {
        state.select_entity(records, Some(entity));
    }

    RequestView {
        dataset,
        state,
        table,
        sankey,
    }
}

type Params = Query<Vec<(String, String)>>;

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Service status and dataset provenance
async fn health_check(State(server): State<Arc<ServerState>>) -> impl IntoResponse {
    let datasets = server
        .datasets
        .iter()
        .map(|d| DatasetHealth {
            chamber: d.chamber,
            info: d.info.clone(),
        })
        .collect();

    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        version: VERSION,
        started_at: server.started_at,
        datasets,
    }))
}

/// GET /api/records - Filtered, sorted table rows (all pages)
async fn get_records(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    let mut rows = filter_rows(&view.dataset.records, &view.state);
    sort_rows(&mut rows, &view.table, &view.state);

    let response: Vec<RowView> = rows.iter().map(|r| row_view(r, &view.state)).collect();
    Json(ApiResponse::ok(response))
}

/// GET /api/records/:url - One full record by its url-encoded key
async fn get_record(
    State(server): State<Arc<ServerState>>,
    Path(url): Path<String>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);

    let decoded = urlencoding::decode(&url)
        .unwrap_or_else(|_| url.clone().into())
        .into_owned();
    // Accept the key with or without its leading slash (it is a path).
    let record: Option<&Record> = view
        .dataset
        .records
        .iter()
        .find(|r| r.url == decoded || r.url.trim_start_matches('/') == decoded);

    match record {
        Some(record) => (StatusCode::OK, Json(ApiResponse::ok(record.clone()))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("Unknown record: {}", decoded))),
        )
            .into_response(),
    }
}

/// GET /api/kpis - Headline figures under the active filter
async fn get_kpis(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    Json(ApiResponse::ok(kpi_summary(
        &view.dataset.records,
        &view.state,
    )))
}

/// GET /api/groups - Per-group aggregates under the active filter
async fn get_groups(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    let visible = visible_records(&view.dataset.records, &view.state);
    let mut colors = server.colors.lock().unwrap();
    let groups = aggregate_by_group(&visible, &view.state, &mut colors);
    Json(ApiResponse::ok(groups))
}

/// GET /api/hierarchy - Group → legislator → company tree
async fn get_hierarchy(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    let mut colors = server.colors.lock().unwrap();
    let tree = build_hierarchy(&view.dataset.records, &view.state, &mut colors);
    Json(ApiResponse::ok(tree))
}

/// GET /api/sankey - Flow graph with top/min/max knobs
async fn get_sankey(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    let mut colors = server.colors.lock().unwrap();
    let graph = build_sankey(&view.dataset.records, &view.state, &mut colors, view.sankey);
    Json(ApiResponse::ok(graph))
}

/// GET /api/stacks - Per-company totals broken down by group
async fn get_stacks(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    Json(ApiResponse::ok(company_stacks(
        &view.dataset.records,
        &view.state,
    )))
}

/// GET /api/companies - Company catalog (picker list)
async fn get_companies(
    State(server): State<Arc<ServerState>>,
    Query(params): Params,
) -> impl IntoResponse {
    let view = parse_request(&server, &params);
    Json(ApiResponse::ok(company_catalog(
        &view.dataset.records,
        &view.state,
    )))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Participations financières - API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let deputes_path = args
        .first()
        .map(String::as_str)
        .unwrap_or("data/deputes.json");

    let deputes = match hatvp_dashboard::load_dataset(std::path::Path::new(deputes_path), Chamber::Deputes)
    {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("❌ Impossible de charger {} : {:#}", deputes_path, e);
            eprintln!("   Lancez fetch_data.py ou passez le chemin en argument.");
            std::process::exit(1);
        }
    };

    let mut datasets = vec![deputes];
    if let Some(senateurs_path) = args.get(1) {
        match hatvp_dashboard::load_dataset(
            std::path::Path::new(senateurs_path),
            Chamber::Senateurs,
        ) {
            Ok(dataset) => datasets.push(dataset),
            Err(e) => eprintln!("⚠️  Dataset sénateurs ignoré : {:#}", e),
        }
    }

    for dataset in &datasets {
        println!(
            "✓ {} : {} entrées ({})",
            dataset.chamber.title(),
            dataset.info.records,
            dataset.info.path
        );
    }

    let mut colors = GroupColors::default();
    colors.seed(&datasets[0].records);

    let state = Arc::new(ServerState {
        datasets,
        colors: Mutex::new(colors),
        started_at: Utc::now(),
    });

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", get(get_records))
        .route("/records/:url", get(get_record))
        .route("/kpis", get(get_kpis))
        .route("/groups", get(get_groups))
        .route("/hierarchy", get(get_hierarchy))
        .route("/sankey", get(get_sankey))
        .route("/stacks", get(get_stacks))
        .route("/companies", get(get_companies))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 API sur http://localhost:3000");
    println!("   http://localhost:3000/api/kpis");
    println!("   http://localhost:3000/api/groups?chamber=deputes&public_only=1");
    println!("\n   Ctrl+C pour arrêter\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
