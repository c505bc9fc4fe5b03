use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

use crate::aggregate::{
    aggregate_by_group, company_catalog, effective_holdings, kpi_summary, short_group_name,
    visible_records, CompanyEntry, GroupAggregate, GroupColors,
};
use crate::dataset::{Dataset, Record};
use crate::filter::FilterState;
use crate::normalize::{format_eur, format_eur_axis, is_non_public};
use crate::table::{self, SortKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Ledger,
    Companies,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Ledger,
            Page::Ledger => Page::Companies,
            Page::Companies => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Companies,
            Page::Ledger => Page::Overview,
            Page::Companies => Page::Ledger,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Vue d'ensemble",
            Page::Ledger => "Détail",
            Page::Companies => "Sociétés",
        }
    }
}

/// Sort keys cycled by the `s` shortcut (company columns are reached by
/// selecting a company instead).
const SORT_CYCLE: &[SortKey] = &[
    SortKey::ValeurTotale,
    SortKey::NbParts,
    SortKey::Nom,
    SortKey::Groupe,
    SortKey::Departement,
];

pub struct App {
    datasets: Vec<Dataset>,
    current: usize,
    pub state: FilterState,
    pub table: table::TableState,
    pub colors: GroupColors,
    pub current_page: Page,
    pub ledger_cursor: TableState,
    pub overview_cursor: TableState,
    pub companies_cursor: TableState,
    pub show_detail: bool,
    pub search_mode: bool,
    pub status: String,
}

impl App {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        let mut colors = GroupColors::default();
        if let Some(dataset) = datasets.first() {
            colors.seed(&dataset.records);
        }

        let mut ledger_cursor = TableState::default();
        ledger_cursor.select(Some(0));
        let mut overview_cursor = TableState::default();
        overview_cursor.select(Some(0));
        let mut companies_cursor = TableState::default();
        companies_cursor.select(Some(0));

        Self {
            datasets,
            current: 0,
            state: FilterState::default(),
            table: table::TableState::default(),
            colors,
            current_page: Page::Overview,
            ledger_cursor,
            overview_cursor,
            companies_cursor,
            show_detail: false,
            search_mode: false,
            status: String::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.datasets[self.current]
    }

    pub fn records(&self) -> &[Record] {
        &self.datasets[self.current].records
    }

    /// Switch chamber when a second dataset is loaded: every filter, sort
    /// and the color cache start over (disjoint group universes).
    pub fn switch_dataset(&mut self) {
        if self.datasets.len() < 2 {
            self.status = "Un seul dataset chargé".to_string();
            return;
        }
        self.current = (self.current + 1) % self.datasets.len();
        self.state = FilterState::default();
        self.table = table::TableState::default();
        self.colors.reset();
        self.colors.seed(&self.datasets[self.current].records);
        self.ledger_cursor.select(Some(0));
        self.overview_cursor.select(Some(0));
        self.companies_cursor.select(Some(0));
        self.status = format!("Dataset : {}", self.dataset().chamber.title());
    }

    pub fn group_aggregates(&mut self) -> Vec<GroupAggregate> {
        let visible = visible_records(&self.datasets[self.current].records, &self.state);
        aggregate_by_group(&visible, &self.state, &mut self.colors)
    }

    pub fn filtered_rows(&self) -> Vec<&Record> {
        let mut rows = table::filter_rows(self.records(), &self.state);
        table::sort_rows(&mut rows, &self.table, &self.state);
        rows
    }

    fn after_filter_change(&mut self) {
        self.table.reset_page();
        self.ledger_cursor.select(Some(0));
    }

    fn cursor_for(&mut self, page: Page) -> &mut TableState {
        match page {
            Page::Overview => &mut self.overview_cursor,
            Page::Ledger => &mut self.ledger_cursor,
            Page::Companies => &mut self.companies_cursor,
        }
    }

    fn move_cursor(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let page = self.current_page;
        let cursor = self.cursor_for(page);
        let i = cursor.selected().unwrap_or(0) as isize + delta;
        let i = i.rem_euclid(len as isize) as usize;
        cursor.select(Some(i));
    }

    /// `g` shortcut: cycle the single-group filter through the groups in
    /// their aggregate order, then back to no selection.
    fn cycle_group(&mut self) {
        let groups: Vec<String> = self
            .group_aggregates_unfiltered()
            .into_iter()
            .map(|g| g.groupe)
            .collect();
        if groups.is_empty() {
            return;
        }
        let next = match &self.state.active_group {
            None => Some(groups[0].clone()),
            Some(current) => groups
                .iter()
                .position(|g| g == current)
                .and_then(|i| groups.get(i + 1))
                .cloned(),
        };
        self.state
            .select_group(&self.datasets[self.current].records, next.as_deref());
        self.after_filter_change();
    }

    /// Group list ignoring the active group/exclusion filters, so the cycle
    /// order stays stable while stepping through.
    fn group_aggregates_unfiltered(&mut self) -> Vec<GroupAggregate> {
        let records = &self.datasets[self.current].records;
        let neutral = FilterState {
            public_only: self.state.public_only,
            ..FilterState::default()
        };
        let visible = visible_records(records, &neutral);
        aggregate_by_group(&visible, &neutral, &mut self.colors)
    }

    /// Enter on the overview: solo / toggle the selected group.
    fn toggle_selected_group(&mut self) {
        let groups = self.group_aggregates();
        let Some(group) = self
            .overview_cursor
            .selected()
            .and_then(|i| groups.get(i))
            .map(|g| g.groupe.clone())
        else {
            return;
        };
        self.state
            .toggle_excluded_group(&self.datasets[self.current].records, &group);
        self.after_filter_change();
    }

    /// Enter on the ledger: filter on the selected legislator, or release
    /// the filter when it is already on them.
    fn toggle_selected_entity(&mut self) {
        let url = {
            let rows = self.filtered_rows();
            let page_rows = table::page_slice(&rows, self.table.page);
            let Some(record) = self
                .ledger_cursor
                .selected()
                .and_then(|i| page_rows.get(i))
            else {
                return;
            };
            record.url.clone()
        };
        if self.state.active_entity.as_deref() == Some(url.as_str()) {
            self.state
                .select_entity(&self.datasets[self.current].records, None);
        } else {
            self.state
                .select_entity(&self.datasets[self.current].records, Some(&url));
        }
        self.after_filter_change();
    }

    /// Enter on the companies page: toggle the selected company and keep
    /// the table sort coupled to the selection.
    fn toggle_selected_company(&mut self) {
        let catalog = company_catalog(self.records(), &self.state);
        let Some(entry) = self
            .companies_cursor
            .selected()
            .and_then(|i| catalog.get(i))
        else {
            return;
        };
        let key = entry.key.clone();
        self.state.toggle_company(&key);
        self.table.sync_company_sort(&self.state);
        self.after_filter_change();
    }

    fn cycle_sort(&mut self) {
        let pos = SORT_CYCLE
            .iter()
            .position(|k| *k == self.table.sort_key)
            .unwrap_or(SORT_CYCLE.len() - 1);
        self.table.sort_key = SORT_CYCLE[(pos + 1) % SORT_CYCLE.len()].clone();
        self.table.descending = true;
        self.table.reset_page();
    }

    fn export_csv(&mut self) {
        let rows = self.filtered_rows();
        let path = std::env::temp_dir().join(format!("hatvp-{}.csv", self.dataset().chamber));
        let result = std::fs::File::create(&path)
            .map_err(anyhow::Error::from)
            .and_then(|file| table::export_csv(file, &rows, &self.state));
        self.status = match result {
            Ok(()) => format!("Export : {} lignes → {}", rows.len(), path.display()),
            Err(e) => format!("Export impossible : {}", e),
        };
    }

    fn clear_filters(&mut self) {
        self.state.clear_all();
        self.table.sync_company_sort(&self.state);
        self.after_filter_change();
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            // Search edit mode swallows every key until Enter/Esc.
            if app.search_mode {
                match key.code {
                    KeyCode::Enter | KeyCode::Esc => app.search_mode = false,
                    KeyCode::Backspace => {
                        let mut q = app.state.search.clone();
                        q.pop();
                        app.state.set_search(&q);
                        app.table.reset_page();
                    }
                    KeyCode::Char(c) => {
                        let q = format!("{}{}", app.state.search, c);
                        app.state.set_search(&q);
                        app.table.reset_page();
                    }
                    _ => {}
                }
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.current_page = app.current_page.previous();
                    } else {
                        app.current_page = app.current_page.next();
                    }
                }
                KeyCode::BackTab => app.current_page = app.current_page.previous(),
                KeyCode::Enter => match app.current_page {
                    Page::Overview => app.toggle_selected_group(),
                    Page::Ledger => app.toggle_selected_entity(),
                    Page::Companies => app.toggle_selected_company(),
                },
                KeyCode::Char(' ') if app.current_page == Page::Ledger => {
                    app.show_detail = !app.show_detail;
                }
                KeyCode::Char('p') => {
                    let on = !app.state.public_only;
                    app.state.set_public_only(on);
                    app.after_filter_change();
                }
                KeyCode::Char('g') => app.cycle_group(),
                KeyCode::Char('c') => app.clear_filters(),
                KeyCode::Char('d') => app.switch_dataset(),
                KeyCode::Char('e') => app.export_csv(),
                KeyCode::Char('s') => app.cycle_sort(),
                KeyCode::Char('r') => {
                    app.table.descending = !app.table.descending;
                    app.table.reset_page();
                }
                KeyCode::Char('/') => {
                    app.search_mode = true;
                    app.current_page = Page::Ledger;
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    let len = current_list_len(app);
                    app.move_cursor(1, len);
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    let len = current_list_len(app);
                    app.move_cursor(-1, len);
                }
                KeyCode::Right if app.current_page == Page::Ledger => {
                    let total = app.filtered_rows().len();
                    if app.table.page < table::page_count(total) {
                        app.table.page += 1;
                        app.ledger_cursor.select(Some(0));
                    }
                }
                KeyCode::Left if app.current_page == Page::Ledger => {
                    if app.table.page > 1 {
                        app.table.page -= 1;
                        app.ledger_cursor.select(Some(0));
                    }
                }
                _ => {}
            }
        }
    }
}

fn current_list_len(app: &mut App) -> usize {
    match app.current_page {
        Page::Overview => app.group_aggregates().len(),
        Page::Ledger => {
            let rows = app.filtered_rows();
            table::page_slice(&rows, app.table.page).len()
        }
        Page::Companies => company_catalog(app.records(), &app.state).len(),
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header: pages + KPIs
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Ledger {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_ledger(f, content[0], app);
        render_detail_panel(f, content[1], app);
    } else {
        match app.current_page {
            Page::Overview => render_overview(f, chunks[1], app),
            Page::Ledger => render_ledger(f, chunks[1], app),
            Page::Companies => render_companies(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

/// "#rrggbb" (or "#rgb") to a terminal color; anything else falls back to
/// white.
fn hex_color(hex: &str) -> Color {
    let hex = hex.trim_start_matches('#');
    let (r, g, b) = match hex.len() {
        6 => (
            u8::from_str_radix(&hex[0..2], 16),
            u8::from_str_radix(&hex[2..4], 16),
            u8::from_str_radix(&hex[4..6], 16),
        ),
        3 => (
            u8::from_str_radix(&hex[0..1], 16).map(|v| v * 17),
            u8::from_str_radix(&hex[1..2], 16).map(|v| v * 17),
            u8::from_str_radix(&hex[2..3], 16).map(|v| v * 17),
        ),
        _ => return Color::White,
    };
    match (r, g, b) {
        (Ok(r), Ok(g), Ok(b)) => Color::Rgb(r, g, b),
        _ => Color::White,
    }
}

/// Proportional unicode bar for the group and company charts.
fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let filled = ((value / max) * width as f64).round() as usize;
    "█".repeat(filled.clamp(1, width))
}

fn render_header(f: &mut Frame, area: Rect, app: &mut App) {
    let kpis = kpi_summary(app.records(), &app.state);
    let chamber = app.dataset().chamber;

    let pages = [Page::Overview, Page::Ledger, Page::Companies];
    let mut spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        chamber.title(),
        Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("{} {}s", kpis.count, chamber.member_word()),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("total {}", format_eur(kpis.total)),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("moyenne {}", format_eur(kpis.mean)),
        Style::default().fg(Color::Gray),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("médiane {}", format_eur(kpis.median)),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(header, area);
}

fn render_overview(f: &mut Frame, area: Rect, app: &mut App) {
    let groups = app.group_aggregates();
    let App {
        datasets,
        current,
        state,
        overview_cursor,
        ..
    } = app;
    let member_word = datasets[*current].chamber.member_word();
    let max_value = groups.first().map(|g| g.valeur).unwrap_or(0.0);

    let header_cells = [
        "Groupe",
        "Membres",
        "Avec part.",
        "Valeur totale",
        "",
        "Médiane",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = groups.iter().map(|g| {
        let color = hex_color(&g.couleur);
        let excluded = state.excluded_groups.contains(&g.groupe);
        let name_style = if excluded {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT)
        } else {
            Style::default().fg(color)
        };
        let pct = g.part_ratio() * 100.0;

        Row::new(vec![
            Cell::from(short_group_name(&g.groupe, "").to_string()).style(name_style),
            Cell::from(format!("{}", g.deputes)),
            Cell::from(format!("{} ({:.0}%)", g.avec_part, pct)),
            Cell::from(format_eur(g.valeur)).style(Style::default().fg(Color::Green)),
            Cell::from(bar(g.valeur, max_value, 20)).style(Style::default().fg(color)),
            Cell::from(format_eur(g.mediane())),
        ])
        .height(1)
    });

    let table_widget = Table::new(
        rows,
        [
            Constraint::Length(24),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(22),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(
                " Groupes politiques — valeur déclarée par {} · barres sur {} ",
                member_word,
                format_eur_axis(max_value, max_value)
            )),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table_widget, area, overview_cursor);
}

fn render_ledger(f: &mut Frame, area: Rect, app: &mut App) {
    let App {
        datasets,
        current,
        state,
        table: sort,
        colors,
        ledger_cursor,
        ..
    } = app;
    let dataset = &datasets[*current];

    let mut rows_all = table::filter_rows(&dataset.records, state);
    table::sort_rows(&mut rows_all, sort, state);
    let total = rows_all.len();
    // The row set may have shrunk since the page was chosen.
    sort.clamp_page(total);
    let pages = table::page_count(total);
    let page_rows = table::page_slice(&rows_all, sort.page);

    // Dynamic company columns when a selection is active, otherwise the
    // top-companies cell.
    let company_keys: Vec<String> = state.active_companies.iter().cloned().collect();

    let mut header_titles: Vec<String> = vec![
        "Nom".into(),
        "Groupe".into(),
        "Dépt".into(),
        "Parts".into(),
        "Valeur".into(),
    ];
    if company_keys.is_empty() {
        header_titles.push("Principales sociétés".into());
    } else {
        for key in &company_keys {
            header_titles.push(key.clone());
        }
    }

    let header = Row::new(header_titles.iter().map(|h| {
        Cell::from(h.as_str()).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let views: Vec<(String, table::RowView, bool)> = page_rows
        .iter()
        .map(|r| {
            let view = table::row_view(r, state);
            let active = state.active_entity.as_deref() == Some(r.url.as_str());
            let color = colors.color_of(r.group());
            (color, view, active)
        })
        .collect();

    let rows = views.iter().map(|(color, view, active)| {
        let mut cells = vec![
            Cell::from(truncate(&view.nom, 26)).style(if *active {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            }),
            Cell::from(truncate(short_group_name(&view.groupe, ""), 18))
                .style(Style::default().fg(hex_color(color))),
            Cell::from(truncate(&view.departement, 14)),
            Cell::from(format!("{}", view.nb_participations)),
            Cell::from(format_eur(view.valeur_totale)).style(Style::default().fg(Color::Green)),
        ];
        if company_keys.is_empty() {
            let mut companies = view.top_societes.join(" · ");
            if view.non_public_count > 0 {
                if !companies.is_empty() {
                    companies.push_str(" · ");
                }
                companies.push_str(&format!("{} non publiée(s)", view.non_public_count));
            }
            cells.push(
                Cell::from(truncate(&companies, 48)).style(Style::default().fg(Color::Gray)),
            );
        } else {
            for value in &view.company_values {
                cells.push(Cell::from(format_eur(*value)).style(Style::default().fg(Color::Cyan)));
            }
        }
        Row::new(cells).height(1)
    });

    let mut constraints = vec![
        Constraint::Length(28),
        Constraint::Length(20),
        Constraint::Length(15),
        Constraint::Length(6),
        Constraint::Length(10),
    ];
    if company_keys.is_empty() {
        constraints.push(Constraint::Min(20));
    } else {
        for _ in &company_keys {
            constraints.push(Constraint::Length(12));
        }
    }

    let sort_dir = if sort.descending { "↓" } else { "↑" };
    let title = format!(
        " {} — {} lignes · page {}/{} · tri {} {} ",
        dataset.chamber.title(),
        total,
        sort.page,
        pages,
        sort.sort_key.label(),
        sort_dir,
    );

    let table_widget = Table::new(rows, constraints)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table_widget, area, ledger_cursor);
}

fn render_companies(f: &mut Frame, area: Rect, app: &mut App) {
    let App {
        datasets,
        current,
        state,
        companies_cursor,
        ..
    } = app;
    let catalog: Vec<CompanyEntry> = company_catalog(&datasets[*current].records, state);
    let max_total = catalog.first().map(|c| c.total).unwrap_or(0.0);

    let header_cells = ["", "Société", "Valeur détenue", ""].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = catalog.iter().map(|entry| {
        let selected = state.active_companies.contains(&entry.key);
        let marker = if selected { "◉" } else { "○" };
        let style = if selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(marker).style(style),
            Cell::from(truncate(&entry.label, 40)).style(style),
            Cell::from(format_eur(entry.total)).style(Style::default().fg(Color::Green)),
            Cell::from(bar(entry.total, max_total, 24)).style(Style::default().fg(Color::Cyan)),
        ])
        .height(1)
    });

    let table_widget = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(42),
            Constraint::Length(14),
            Constraint::Length(26),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(
                " Sociétés déclarées ({}) — Entrée pour filtrer ",
                catalog.len()
            )),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table_widget, area, companies_cursor);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &mut App) {
    let App {
        datasets,
        current,
        state,
        table: sort,
        colors,
        ledger_cursor,
        ..
    } = app;
    let mut rows = table::filter_rows(&datasets[*current].records, state);
    table::sort_rows(&mut rows, sort, state);
    let page_rows = table::page_slice(&rows, sort.page);
    let record = ledger_cursor
        .selected()
        .and_then(|i| page_rows.get(i).copied());

    let Some(record) = record else {
        let empty = Paragraph::new("Aucune ligne sélectionnée").block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Déclaration "),
        );
        f.render_widget(empty, area);
        return;
    };
    let group_color = colors.color_of(record.group());

    let mut content = vec![
        Line::from(""),
        Line::from(vec![Span::styled(
            format!("  {}", record.display_name()),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                record.group().to_string(),
                Style::default().fg(hex_color(&group_color)),
            ),
            Span::raw("  "),
            Span::styled(
                record.departement.clone(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Total déclaré : ", Style::default().fg(Color::Cyan)),
            Span::styled(
                format_eur(record.valeur_totale),
                Style::default().fg(Color::Green),
            ),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "  PARTICIPATIONS",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )]),
        Line::from(""),
    ];

    let mut holdings = effective_holdings(record, state);
    holdings.sort_by(|a, b| {
        b.value()
            .partial_cmp(&a.value())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for holding in holdings {
        if is_non_public(&holding.societe) {
            // The declared value of these lines is never shown: undisclosed.
            content.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(
                    "Non publié — valeur non divulguée",
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ),
            ]));
            continue;
        }
        let mut spans = vec![
            Span::raw("  "),
            Span::styled(
                truncate(&holding.societe, 28),
                Style::default().fg(Color::White),
            ),
            Span::raw("  "),
            Span::styled(
                format_eur(holding.value()),
                Style::default().fg(Color::Green),
            ),
        ];
        if holding.nb_parts > 0.0 {
            spans.push(Span::styled(
                format!("  ({} parts)", holding.nb_parts as i64),
                Style::default().fg(Color::DarkGray),
            ));
        }
        if holding.remuneration > 0.0 {
            spans.push(Span::styled(
                format!("  rém. {}", format_eur(holding.remuneration)),
                Style::default().fg(Color::DarkGray),
            ));
        }
        content.push(Line::from(spans));
    }

    content.push(Line::from(""));
    content.push(Line::from(vec![Span::styled(
        format!("  hatvp.fr{}", record.url),
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )]));

    let panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Déclaration "),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];

    if app.search_mode {
        spans.push(Span::styled(
            format!(" Recherche : {}_ ", app.state.search),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw("(Entrée pour valider, Échap pour sortir)"));
    } else {
        // Active filters, most specific first.
        if let Some(url) = &app.state.active_entity {
            let name = app
                .records()
                .iter()
                .find(|r| &r.url == url)
                .map(|r| r.display_name())
                .unwrap_or_else(|| url.clone());
            spans.push(Span::styled(
                format!(" {} ", name),
                Style::default().fg(Color::Yellow),
            ));
        } else if let Some(group) = &app.state.active_group {
            spans.push(Span::styled(
                format!(" {} ", short_group_name(group, "")),
                Style::default().fg(Color::Yellow),
            ));
        } else if !app.state.excluded_groups.is_empty() {
            spans.push(Span::styled(
                format!(" {} groupe(s) masqué(s) ", app.state.excluded_groups.len()),
                Style::default().fg(Color::Yellow),
            ));
        }
        if !app.state.active_companies.is_empty() {
            spans.push(Span::styled(
                format!(" {} société(s) ", app.state.active_companies.len()),
                Style::default().fg(Color::Cyan),
            ));
        }
        if app.state.public_only {
            spans.push(Span::styled(
                " bourse uniquement ",
                Style::default().fg(Color::Magenta),
            ));
        }
        if !app.state.search.is_empty() {
            spans.push(Span::styled(
                format!(" \"{}\" ", app.state.search),
                Style::default().fg(Color::Cyan),
            ));
        }
        if !app.status.is_empty() {
            spans.push(Span::styled(
                format!(" {} ", app.status),
                Style::default().fg(Color::Green),
            ));
        }

        spans.push(Span::raw(" | "));
        for (key, action) in [
            ("Tab", "page"),
            ("Entrée", "filtrer"),
            ("Espace", "détail"),
            ("/", "chercher"),
            ("g", "groupe"),
            ("p", "bourse"),
            ("s", "tri"),
            ("r", "sens"),
            ("e", "export"),
            ("d", "chambre"),
            ("c", "effacer"),
            ("q", "quitter"),
        ] {
            spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(format!(" {} | ", action)));
        }
    }

    let status = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(status, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
