use anyhow::{Context, Result};
use clap::Parser;
use feedmux::{Client, Config, SortOrder, Source};
use std::io::Write;
use std::path::PathBuf;

/// Get the config directory path (~/.config/feedmux/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedmux"))
}

#[derive(Parser, Debug)]
#[command(name = "feedmux", about = "Merge RSS and Atom feeds into one timeline")]
struct Args {
    /// Config file (default: ~/.config/feedmux/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory that file sources are read from
    #[arg(long, value_name = "DIR")]
    storage_root: Option<PathBuf>,

    /// Deadline for the whole fetch, in seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// Sort order: asc or desc
    #[arg(long, value_name = "ORDER")]
    order: Option<SortOrder>,

    /// Extra sources: URLs, or paths relative to the storage root
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the feed on stdout stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(root) = args.storage_root {
        config.storage_root = Some(root);
    }
    if let Some(secs) = args.deadline {
        if secs == 0 {
            anyhow::bail!("--deadline must be at least 1 second");
        }
        config.deadline_secs = secs;
    }
    if let Some(order) = args.order {
        config.sort_order = order;
    }

    let mut client = Client::new(&config).context("Failed to initialize HTTP client")?;
    client.add_sources(args.sources.iter().map(|path| Source::guess(path.as_str(), path.as_str())));

    if client.list_sources().is_empty() {
        anyhow::bail!(
            "No sources configured: add [[sources]] to {} or pass feed URLs as arguments",
            config_path.display()
        );
    }

    let feed = client.load_all().await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for item in feed {
        let date = item
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "----------------".to_string());
        let source = item.source().map(|s| s.title.clone()).unwrap_or_default();
        writeln!(out, "{date}  [{source}]  {}", item.title).context("Failed to write to stdout")?;
    }
    drop(out);

    for diagnostic in client.diagnostics() {
        eprintln!("warning: {}: {}", diagnostic.source.title, diagnostic.error);
    }

    Ok(())
}
