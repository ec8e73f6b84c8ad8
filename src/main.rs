use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use rview::controller::Controller;
use rview::dataset::Dataset;
use rview::domain::{RVConfig, RVError};
use rview::logging::{LogConfig, init_logging};
use rview::model::{Model, Status};
use rview::ui::TableUI;

/// Browse a CSV or JSON report: filter, sort, page, count values and export.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Report file (csv, tsv, txt or json)
    path: String,

    /// Field delimiter, detected from the header line when omitted
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Number of values listed in the value count view
    #[arg(long, default_value_t = 20)]
    top_n: usize,

    /// Directory proposed for exports
    #[arg(long, default_value = ".")]
    export_dir: String,

    /// Report category, defaults to the file stem
    #[arg(long)]
    category: Option<String>,

    /// Report period, e.g. 2024-05
    #[arg(long)]
    period: Option<String>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let result = run(args);
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand(path: &str) -> Result<PathBuf, RVError> {
    let expanded = shellexpand::full(path).map_err(|e| RVError::LoadingFailed(e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load(args: &Args, config: &RVConfig) -> Result<Dataset, RVError> {
    let path = expand(&args.path)?;
    let mut dataset = Dataset::load(path.clone(), config.delimiter)?;

    let meta = dataset.meta_mut();
    if let Some(category) = &args.category {
        meta.category = category.clone();
    } else if meta.category.is_empty() {
        meta.category = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
    }
    if let Some(period) = &args.period {
        meta.period = period.clone();
    }
    Ok(dataset)
}

fn run(args: Args) -> Result<(), RVError> {
    let defaults = LogConfig::default();
    let log_config = LogConfig {
        level: args.log_level.clone(),
        log_file: args.log_file.clone().unwrap_or(defaults.log_file),
    };
    init_logging(&log_config)?;

    let mut config = RVConfig::default()
        .chart_top_n(args.top_n)
        .export_dir(expand(&args.export_dir)?);
    if let Some(delimiter) = args.delimiter {
        config = config.delimiter(delimiter);
    }
    info!("Starting rview with {config:?}");

    let dataset = load(&args, &config)?;

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&config, size.width as usize, size.height as usize);
    model.load_dataset(dataset);

    let ui = TableUI::new();
    let controller = Controller::new(&config);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(Some(message))?;
        };
    }

    info!("Quitting rview");
    Ok(())
}
