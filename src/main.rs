use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};

use hatvp_dashboard::{
    aggregate_by_group, format_eur, kpi_summary, load_dataset, short_group_name, visible_records,
    Chamber, Dataset, FilterState, GroupColors,
};

const DEFAULT_DEPUTES: &str = "data/deputes.json";
const DEFAULT_SENATEURS: &str = "data/senateurs.json";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "summary" {
        // Plain-stdout mode, for terminals without the TUI
        run_summary(&args[2..])?;
    } else {
        run_ui_mode(&args[1..])?;
    }

    Ok(())
}

/// Resolve dataset paths from the CLI: explicit paths win, otherwise the
/// conventional data/ files (the sénateurs file is optional).
fn load_datasets(args: &[String]) -> Result<Vec<Dataset>> {
    let mut datasets = Vec::new();

    let deputes_path = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEPUTES));
    if !deputes_path.exists() {
        bail!(
            "Dataset introuvable : {}\n   Lancez fetch_data.py pour le générer, \
             ou passez son chemin en argument.",
            deputes_path.display()
        );
    }
    datasets.push(load_dataset(&deputes_path, Chamber::Deputes)?);

    let senateurs_path = args.get(1).map(PathBuf::from);
    match senateurs_path {
        Some(path) => {
            datasets.push(load_dataset(&path, Chamber::Senateurs)?);
        }
        None => {
            let default = Path::new(DEFAULT_SENATEURS);
            if default.exists() {
                datasets.push(load_dataset(default, Chamber::Senateurs)?);
            }
        }
    }

    Ok(datasets)
}

fn print_banner(datasets: &[Dataset]) {
    for dataset in datasets {
        println!(
            "✓ {} : {} entrées · {} participations",
            dataset.chamber.title(),
            dataset.info.records,
            dataset.info.participations
        );
        println!(
            "  {} · sha256 {}…",
            dataset.info.path,
            &dataset.info.fingerprint[..12]
        );
    }
}

fn run_summary(args: &[String]) -> Result<()> {
    println!("📊 Participations financières — synthèse");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let datasets = load_datasets(args)?;
    print_banner(&datasets);

    let state = FilterState::default();
    for dataset in &datasets {
        let kpis = kpi_summary(&dataset.records, &state);
        println!("\n— {} —", dataset.chamber.title());
        println!(
            "  {} {}s · total {} · moyenne {} · médiane {}",
            kpis.count,
            dataset.chamber.member_word(),
            format_eur(kpis.total),
            format_eur(kpis.mean),
            format_eur(kpis.median)
        );

        let mut colors = GroupColors::default();
        colors.seed(&dataset.records);
        let visible = visible_records(&dataset.records, &state);
        for group in aggregate_by_group(&visible, &state, &mut colors) {
            println!(
                "  {:<24} {:>4} membres · {:>3} avec part. · {}",
                short_group_name(&group.groupe, ""),
                group.deputes,
                group.avec_part,
                format_eur(group.valeur)
            );
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(args: &[String]) -> Result<()> {
    use hatvp_dashboard::ui;

    println!("🖥️  Chargement du tableau de bord...\n");

    let datasets = load_datasets(args)?;
    print_banner(&datasets);
    println!("\nOuverture de l'interface... ('q' pour quitter)\n");

    let mut app = ui::App::new(datasets);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_args: &[String]) -> Result<()> {
    eprintln!("❌ Interface TUI non disponible !");
    eprintln!("   Recompilez avec : cargo build --features tui");
    eprintln!("   Ou utilisez : cargo run summary");
    eprintln!("   Ou le serveur : cargo run --bin hatvp-server --features server");
    std::process::exit(1);
}
