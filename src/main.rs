use clap::{Parser, Subcommand};
use imgq::output::{self, RenderReport};
use imgq::{ServiceConfig, config, process_request, shared_engine};
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "imgq")]
#[command(about = "Image operations from URL query parameters")]
#[command(long_about = "\
Image operations from URL query parameters

A request URL names a source image and the operations to apply, in order:

  http://svc/img?url=https://cdn/photo.jpg&resize=800&blur=1.5&format=WEBP
  http://svc/img?empty=400,300(color=336699ff)&border=4(color=000000ff)

Source (exactly one):
  url=URL               fetch and decode an image
  empty=W,H(color=HEX)  blank canvas, transparent by default

Output:
  format=NAME           PNG, JPEG, WEBP, TIFF or AVIF (default: source format)

Overlays and sources that point back at the same origin and path are
rendered in-process from their own query string.

Run 'imgq ops' to list operations, 'imgq gen-config' for a documented imgq.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = defaults; IMGQ_* env vars override)
    #[arg(long, default_value = "imgq.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run request URLs through the pipeline and write the responses
    Render {
        /// Request URLs, e.g. "http://svc/img?empty=10,10&blur=1"
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory for response bodies, named <index>.<ext>
        #[arg(long, default_value = "imgq-out")]
        output_dir: PathBuf,
    },
    /// List the registered operations with their arity and flags
    Ops,
    /// Print a stock imgq.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Render { urls, output_dir } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config);
            std::fs::create_dir_all(&output_dir)?;
            let reports = render_all(&urls, &config, &output_dir)?;
            for report in &reports {
                for line in output::format_render_report(report) {
                    println!("{line}");
                }
            }
            let failed = reports.iter().filter(|r| r.status >= 400).count();
            info!("Rendered {} request(s), {failed} failed", reports.len());
        }
        Command::Ops => {
            for line in output::format_ops_table() {
                println!("{line}");
            }
        }
        Command::GenConfig => {
            print!("{}", config::config_template());
        }
    }

    Ok(())
}

/// Process every URL in parallel and write each successful response body.
///
/// Reports come back in input order.
fn render_all(
    urls: &[String],
    config: &ServiceConfig,
    output_dir: &Path,
) -> Result<Vec<RenderReport>, Box<dyn std::error::Error>> {
    let engine = shared_engine()?;
    let reports = urls
        .par_iter()
        .enumerate()
        .map(|(i, url)| {
            let outcome = process_request(url, config, engine);
            let summary = output::outcome_summary(&outcome);
            let response = outcome.into_response(config.show_stack_on_err);
            let index = i + 1;
            let written = if response.is_success() {
                let path = output_dir.join(format!("{index}.{}", output::extension_for(&response)));
                std::fs::write(&path, &response.body)?;
                Some(path)
            } else {
                None
            };
            Ok(RenderReport {
                index,
                url: url.clone(),
                status: response.status,
                summary,
                bytes: response.body.len(),
                written,
            })
        })
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    Ok(reports)
}

/// Initialize the rayon thread pool based on config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(config: &ServiceConfig) {
    let threads = config::effective_threads(config);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
