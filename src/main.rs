use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use namegrid::controller::Controller;
use namegrid::dataset::{BOYS_URL, DatasetId, GIRLS_URL, Sources};
use namegrid::domain::{NGConfig, NGError};
use namegrid::loader::HttpFetcher;
use namegrid::model::{Model, Status};
use namegrid::ui::TableUI;

/// A tui based viewer for the baby names dataset.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Dataset shown at startup (boys, girls, M or F)
    #[arg(short, long, default_value = "boys", value_parser = parse_dataset)]
    dataset: DatasetId,

    /// Source of the boys csv
    #[arg(long, default_value = BOYS_URL)]
    boys_url: String,

    /// Source of the girls csv
    #[arg(long, default_value = GIRLS_URL)]
    girls_url: String,

    /// Records per page
    #[arg(long, default_value_t = 100)]
    page_size: usize,

    /// Seconds before a load is given up
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Widest a column is drawn, in characters
    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Log file, the terminal belongs to the ui. Level is taken from RUST_LOG.
    #[arg(long, default_value = "~/.cache/namegrid.log")]
    log_file: String,
}

impl From<&Args> for NGConfig {
    fn from(args: &Args) -> Self {
        NGConfig::default()
            .page_size(args.page_size)
            .max_column_width(args.max_column_width)
            .fetch_timeout(Duration::from_secs(args.timeout))
            .initial_dataset(args.dataset)
            .sources(
                Sources::default()
                    .with(DatasetId::Boys, &args.boys_url)
                    .with(DatasetId::Girls, &args.girls_url),
            )
    }
}

fn parse_dataset(s: &str) -> Result<DatasetId, String> {
    s.parse().map_err(|e: NGError| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let result = run(&args);
    ratatui::restore();
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(log_file: &str) -> Result<(), NGError> {
    let path = shellexpand::full(log_file)
        .map_err(|e| NGError::IoError(std::io::Error::other(e.to_string())))?;
    let path = PathBuf::from(path.as_ref());
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: &Args) -> Result<(), NGError> {
    init_logging(&args.log_file)?;
    info!("Starting namegrid with {:?}", args);

    let config = NGConfig::from(args);
    let runtime = tokio::runtime::Runtime::new()?;
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout)?);

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(
        &config,
        fetcher,
        runtime.handle().clone(),
        size.width as usize,
        size.height as usize,
    )?;
    let mut ui = TableUI::new();
    let controller = Controller::new(&config);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}
