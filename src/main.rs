use anyhow::Result;
use clap::Parser;
use console::style;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segment_extractor::cli::prompt;
use segment_extractor::{
    cleanup, utils, Cli, Commands, Config, ExtractionPipeline, ExtractorError, HttpDownloader,
    TerminalConsole, TranscodingQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "segment_extractor=debug"
    } else {
        "segment_extractor=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Extract {
            date,
            start_time,
            hours,
            base_url,
            output_dir,
        } => {
            let config = Config::load(cli.config.as_deref()).await?;

            // Check for required external dependencies (non-fatal)
            let missing_deps = utils::check_dependencies(
                &config.transcoder.ffmpeg_path,
                &config.transcoder.noise_profile,
            )
            .await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - failed segments will be reported)");
            }

            let base_url = base_url
                .or_else(|| config.source.base_url.clone())
                .ok_or(ExtractorError::MissingBaseUrl)?;
            utils::validate_base_url(&base_url)?;

            let request = prompt::complete_request(date, start_time, hours)?;
            let output_dir = output_dir.unwrap_or_else(|| config.output.dir.clone());

            let terminal = Arc::new(TerminalConsole::new(!cli.quiet));
            let queue = TranscodingQueue::new(
                Arc::new(config.transcoder()),
                terminal.clone(),
                terminal.clone(),
                config.queue_settings(),
            );
            let pipeline =
                ExtractionPipeline::new(HttpDownloader::new(), queue, terminal, base_url, output_dir);

            tracing::info!("Starting extraction: {:?}", request);
            let summary = pipeline.run(request).await?;
            tracing::info!(
                "Processed {} of {} segments ({} downloads failed)",
                summary.transcoded,
                summary.planned,
                summary.failed_downloads
            );
        }
        Commands::Cleanup { output_dir } => {
            let output_dir = match output_dir {
                Some(dir) => dir,
                None => Config::load(cli.config.as_deref()).await?.output.dir,
            };

            let started = Instant::now();
            println!("{}", style("Deleting raw downloads in output directory...").bold());
            let removed = cleanup::remove_downloads(&output_dir)?;
            for dir in &removed {
                tracing::info!("Removed {}", dir.display());
            }
            println!(
                "{} {}ms.",
                style("✨ Finished in").green().bold(),
                started.elapsed().as_millis()
            );
        }
        Commands::Config { show } => {
            if show {
                Config::load(cli.config.as_deref()).await?.display();
            } else {
                Config::print_location(cli.config.as_deref())?;
            }
        }
    }

    Ok(())
}
