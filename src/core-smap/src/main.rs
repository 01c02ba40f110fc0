use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use data_model_smap::config::SitemapConfig;

use core_smap::{DEFAULT_LOG_SETTINGS, RenderedDocument, SitemapEngine, setup_logging};

#[derive(Parser)]
#[command(name = "core-smap")]
#[command(about = "Resolve and prerender sitemaps from a sitemap configuration", long_about = None)]
struct CoreCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved entries of one sitemap as JSON.
    Resolve {
        /// The JSON sitemap configuration.
        #[arg(short, long, value_parser = validate_input_file)]
        config: PathBuf,
        /// Sitemap name. Defaults to the single (or first) sitemap.
        #[arg(short, long)]
        sitemap: Option<String>,
        /// Site URL used for relative sources and absolute locs, when the config has none.
        #[arg(long, value_parser = validate_url)]
        site_url: Option<String>,
    },

    /// Write every sitemap document (index, named sitemaps, chunks) to a directory.
    Render {
        #[arg(short, long, value_parser = validate_input_file)]
        config: PathBuf,
        /// Output directory. Created if missing.
        #[arg(short, long, value_parser = validate_output_dir)]
        out: PathBuf,
        #[arg(long, value_parser = validate_url)]
        site_url: Option<String>,
        /// Fail on any source failure.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}

fn validate_url(s: &str) -> Result<String, String> {
    url::Url::parse(s)
        .map(|_| s.to_string())
        .map_err(|e| format!("Invalid URL: {}", e))
}

fn validate_input_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);

    if !path.exists() {
        return Err(format!("Input path does not exist: {}", path.display()));
    }

    if !path.is_file() {
        return Err(format!("Input path is not a file: {}", path.display()));
    }

    Ok(path)
}

fn validate_output_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);

    if path.exists() && !path.is_dir() {
        return Err(format!("Output path is not a directory: {}", path.display()));
    }

    Ok(path)
}

fn load_config(path: &Path, site_url: Option<String>) -> anyhow::Result<SitemapConfig> {
    let mut config =
        SitemapConfig::from_file(path).with_context(|| format!("Cannot load sitemap config {}", path.display()))?;
    if site_url.is_some() {
        config.site_url = site_url;
    }
    if config.site_url.is_none() {
        bail!("No site URL: set `site_url` in {} or pass --site-url", path.display());
    }
    Ok(config)
}

fn write_documents(out: &Path, documents: &[RenderedDocument]) -> anyhow::Result<()> {
    for document in documents {
        let target = out.join(document.path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        std::fs::write(&target, &document.body).with_context(|| format!("Cannot write {}", target.display()))?;
        tracing::info!(path = %target.display(), entries = document.entries, "wrote sitemap document");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging(DEFAULT_LOG_SETTINGS);

    let cli = CoreCli::parse();

    match cli.command {
        Commands::Resolve {
            config,
            sitemap,
            site_url,
        } => {
            let config = load_config(&config, site_url)?;
            let engine = SitemapEngine::new(config)?;
            let scope = engine.scope(None)?;
            let name = match sitemap.or_else(|| engine.layout().groups().first().map(|g| g.sitemap.clone())) {
                Some(name) => name,
                None => bail!("The configuration declares no sitemaps"),
            };
            let entries = scope.resolve_named(&name).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }

        Commands::Render {
            config,
            out,
            site_url,
            strict,
        } => {
            let config = load_config(&config, site_url)?;
            let engine = SitemapEngine::new(config)?.strict(strict);
            let scope = engine.scope(None)?;
            let documents = scope.render_all().await?;
            std::fs::create_dir_all(&out).with_context(|| format!("Cannot create {}", out.display()))?;
            write_documents(&out, &documents)?;
            println!("Wrote {} sitemap documents to {}", documents.len(), out.display());
        }
    }

    Ok(())
}
