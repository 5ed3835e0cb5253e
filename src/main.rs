mod app;
mod color;
mod data;
mod plot;
mod state;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use data::loader::{self, COMBINED_FILE};
use plot::{Figure, PlotOptions, SeedMode};

/// Collate per-run loss logs into one table and plot them
#[derive(Parser, Debug)]
#[command(name = "plot-loss", version, about)]
struct Args {
    /// Directory for results
    #[arg(long, default_value = "results/pretraining")]
    results_dir: PathBuf,

    /// Create csv, overwrites if exists
    #[arg(long)]
    create_csv: bool,

    /// How much to reduce the data by
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    bin_size: u64,

    /// Row filter, e.g. "env == 'Pong' and lr < 1e-3"
    #[arg(long)]
    query: Option<String>,

    /// Hue variable
    #[arg(long)]
    hue: Option<String>,

    /// Style variable
    #[arg(long)]
    style: Option<String>,

    /// How to handle seeds: average, all, or a list such as 1,2,3
    #[arg(long, default_value = "average")]
    seed: String,

    /// No plots
    #[arg(long)]
    no_plot: bool,

    /// Does not show plots
    #[arg(long)]
    no_show: bool,

    /// Save the plot here
    #[arg(long)]
    save_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bin_size = args.bin_size as usize;
    let combined = args.results_dir.join(COMBINED_FILE);

    if args.create_csv {
        log::info!("Recreating csv in results directory");
        log::info!("Binning by {bin_size}");
        let table = loader::collate_results(&args.results_dir, bin_size)?;
        loader::write_table(&table, &combined)?;
        log::info!("Wrote {}", combined.display());
    }

    if args.no_plot {
        return Ok(());
    }

    if let Some(save_path) = &args.save_path {
        create_parent_dirs(save_path)?;
    }

    let mut table = loader::read_table(&combined)?;

    if let Some(query) = &args.query {
        log::info!("Filtering with {query}");
        data::filter::filter_table(&mut table, query)
            .with_context(|| format!("invalid query {query:?}"))?;
        log::info!("{} rows match", table.len());
    }

    let hue = args.hue.as_deref().unwrap_or("None");
    let style = args.style.as_deref().unwrap_or("None");
    log::info!("Plotting using hue={hue}, style={style}, {}", args.seed);
    let seed: SeedMode = args.seed.parse()?;

    let options = PlotOptions {
        hue: args.hue.clone(),
        style: args.style.clone(),
        seed,
        bin_size,
    };
    let figure = Figure::build(&table, &options)?;

    if let Some(save_path) = &args.save_path {
        plot::render::save_figure(&figure, save_path)?;
    }

    if !args.no_show {
        app::show_figure(figure)?;
    }
    Ok(())
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cli() {
        let args = Args::try_parse_from(["plot-loss"]).unwrap();
        assert_eq!(args.results_dir, PathBuf::from("results/pretraining"));
        assert_eq!(args.bin_size, 100);
        assert_eq!(args.seed, "average");
        assert!(!args.create_csv && !args.no_plot && !args.no_show);
        assert!(args.query.is_none() && args.save_path.is_none());
    }

    #[test]
    fn zero_bin_size_is_rejected() {
        assert!(Args::try_parse_from(["plot-loss", "--bin-size", "0"]).is_err());
    }

    #[test]
    fn seed_mode_is_parsed_late() {
        // An unknown seed mode must not stop --create-csv from running.
        let args = Args::try_parse_from(["plot-loss", "--create-csv", "--seed", "median"]).unwrap();
        assert!(args.create_csv);
        assert!(args.seed.parse::<SeedMode>().is_err());
    }

    #[test]
    fn parent_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("figs/nested/loss.png");
        create_parent_dirs(&target).unwrap();
        assert!(dir.path().join("figs/nested").is_dir());
        create_parent_dirs(Path::new("loss.png")).unwrap();
    }

    #[test]
    fn collate_filter_and_build_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        for (name, env, seed) in [("a", "Pong", 1), ("b", "Pong", 2), ("c", "Breakout", 1)] {
            let run = dir.path().join(name);
            std::fs::create_dir_all(&run).unwrap();
            let mut csv = String::from("step,loss\n");
            for i in 0..250 {
                csv.push_str(&format!("{i},{}\n", 2.0 - i as f64 / 250.0));
            }
            std::fs::write(run.join(loader::LOSS_FILE), csv).unwrap();
            std::fs::write(
                run.join(loader::PARAMS_FILE),
                format!(r#"{{"env": "{env}", "seed": {seed}}}"#),
            )
            .unwrap();
        }

        let table = loader::collate_results(dir.path(), 100).unwrap();
        assert_eq!(table.len(), 6);
        let combined = dir.path().join(COMBINED_FILE);
        loader::write_table(&table, &combined).unwrap();

        let mut table = loader::read_table(&combined).unwrap();
        data::filter::filter_table(&mut table, "env == 'Pong'").unwrap();
        assert_eq!(table.len(), 4);

        let options = PlotOptions {
            hue: None,
            style: None,
            seed: "all".parse().unwrap(),
            bin_size: 100,
        };
        let figure = Figure::build(&table, &options).unwrap();
        assert_eq!(figure.panels.len(), 1);
        assert_eq!(figure.panels[0].series.len(), 2);
        assert_eq!(figure.layout.columns, 1);
    }
}
