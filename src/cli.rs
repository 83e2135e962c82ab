use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::RunConfig;
use crate::data::model::NormalizationType;

#[derive(Parser, Debug)]
#[command(name = "xray-phasemap")]
#[command(version)]
#[command(about = "Load, cache and render X-ray microanalysis element maps", long_about = None)]
pub struct Cli {
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the requested elements and fill the sample's cache store
    Load(RequestArgs),
    /// Resolve the requested elements and write one PNG per element
    Render {
        #[command(flatten)]
        request: RequestArgs,

        /// Output directory for images (defaults to the data directory)
        #[arg(long)]
        graphics_dir: Option<PathBuf>,

        /// Image file prefix (defaults to the sample name)
        #[arg(long)]
        basename: Option<String>,
    },
    /// List the maps held in a sample's cache store
    Inspect {
        /// Sample name
        #[arg(short, long)]
        sample: String,

        /// Directory holding the cache store
        #[arg(short, long, env = "XRAY_PHASEMAP_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// JSON run configuration; flags given here override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sample name
    #[arg(short, long)]
    pub sample: Option<String>,

    /// Element symbols, comma separated (e.g. Fe,O,Si)
    #[arg(short, long, value_delimiter = ',')]
    pub elements: Vec<String>,

    /// Normalization type: "atom norm" or "weight norm" (aliases: atomic, weight)
    #[arg(short, long)]
    pub normalization: Option<NormalizationType>,

    /// Directory holding the source files and the cache store
    #[arg(short, long, env = "XRAY_PHASEMAP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Source file extension (txt or tif)
    #[arg(short = 'x', long)]
    pub extension: Option<String>,

    /// Discard the sample's cache store and rebuild it from source files
    #[arg(long, overrides_with = "no_overwrite")]
    pub overwrite: bool,

    /// Keep the cache store even if the config file asks for a rebuild
    #[arg(long, overrides_with = "overwrite")]
    pub no_overwrite: bool,

    /// Write per-element diagnostics as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RequestArgs {
    /// `Some` only when the command line says something about rebuilding.
    fn overwrite(&self) -> Option<bool> {
        match (self.overwrite, self.no_overwrite) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Config file values with the command line laid on top.
    pub fn run_config(&self) -> Result<RunConfig> {
        let base = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        Ok(base.merge(RunConfig {
            sample: self.sample.clone(),
            elements: self.elements.clone(),
            normalization: self.normalization,
            data_dir: self.data_dir.clone(),
            extension: self.extension.clone(),
            overwrite: self.overwrite(),
            graphics_dir: None,
            basename: None,
        }))
    }
}
