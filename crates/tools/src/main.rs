use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foundation::bounds::BoundingBox;
use layers::DashboardConfig;
use streaming::LayerKey;
use tools::{ReportRequest, ToolError, list_layers, parse_bbox, run_report};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "atlas", about = "Headless mosquito-activity dashboard driver")]
struct Cli {
    /// Dashboard config (JSON). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the layer files; overrides the config.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Mask values of features outside the study area.
    #[arg(long, global = true)]
    limited: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the layer catalog.
    Layers,
    /// Load viewports for a layer and print its aggregate statistics.
    Report {
        #[arg(long)]
        layer: Option<String>,
        /// minx,miny,maxx,maxy. Repeat to pan through several views.
        #[arg(long = "bbox", required = true, value_parser = parse_bbox)]
        viewports: Vec<BoundingBox>,
        #[arg(long)]
        week: Option<u32>,
        /// Natural key of a feature to summarize.
        #[arg(long)]
        feature: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main(Cli::parse()).await {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn real_main(cli: Cli) -> Result<(), ToolError> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(root) = cli.data_root {
        config.data_root = root;
    }
    if cli.limited {
        config.limited_version = true;
    }

    let json = match cli.command {
        Command::Layers => to_json(&list_layers(&config.catalog()?))?,
        Command::Report {
            layer,
            viewports,
            week,
            feature,
        } => {
            let request = ReportRequest {
                layer: layer.map(LayerKey::new),
                viewports,
                week,
                feature,
            };
            to_json(&run_report(&config, &request).await?)?
        }
    };
    println!("{json}");
    Ok(())
}

fn to_json(value: &impl serde::Serialize) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::Usage(format!("encode output: {e}")))
}
