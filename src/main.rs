use anyhow::{bail, Result};
use clap::Parser;
use log::warn;

use xray_phasemap::cache::CacheHandle;
use xray_phasemap::cli::{Cli, Commands, RequestArgs};
use xray_phasemap::config::RunConfig;
use xray_phasemap::render::{save_element_images, RenderOptions};
use xray_phasemap::report::{store_summary, LoadReport};
use xray_phasemap::{load_elements, LoadedMaps};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Load(args) => {
            run_request(&args)?;
        }
        Commands::Render {
            request,
            graphics_dir,
            basename,
        } => {
            let (config, loaded) = run_request(&request)?;
            let config = config.merge(RunConfig {
                graphics_dir,
                basename,
                ..Default::default()
            });
            if loaded.maps.is_empty() {
                warn!("nothing to render");
                return Ok(());
            }
            let written = save_element_images(
                &loaded.maps,
                &config.graphics_dir(),
                &config.basename(),
                &RenderOptions::default(),
            )?;
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Inspect { sample, data_dir } => {
            let path = CacheHandle::store_path(&data_dir, &sample);
            if !path.exists() {
                bail!("no cache store for sample '{sample}' at {}", path.display());
            }
            let store = CacheHandle::open_or_create(&data_dir, &sample)?;
            let groups: Vec<String> = store.groups().map(|g| g.to_string()).collect();
            println!("{} (groups: {})", path.display(), groups.join(", "));
            let summary = store_summary(&store)?;
            store.close()?;
            println!("{}", arrow::util::pretty::pretty_format_batches(&[summary])?);
        }
    }
    Ok(())
}

/// Build the request, load it, print a per-element summary and the optional report.
fn run_request(args: &RequestArgs) -> Result<(RunConfig, LoadedMaps)> {
    let config = args.run_config()?;
    let request = config.to_request()?;
    let loaded = load_elements(&request)?;

    for report in &loaded.diagnostics {
        println!("{:<4} {}", report.element, report.outcome);
    }
    match loaded.shape {
        Some(shape) => println!(
            "{} of {} elements, {shape}",
            loaded.maps.len(),
            request.elements.len()
        ),
        None => println!("0 of {} elements", request.elements.len()),
    }

    if let Some(path) = &args.report {
        LoadReport::new(&request, &loaded).write(path)?;
    }
    Ok((config, loaded))
}
