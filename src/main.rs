use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use research_harvest::config::{expand_tilde, resolve_config, Config, LoggingConfig};
use research_harvest::maintenance::LibraryMaintenance;
use research_harvest::models::SearchQuery;
use research_harvest::pipeline::Pipeline;
use research_harvest::sink::{ReferenceSink, ZoteroCliSink};
use research_harvest::sources::{FetchWaterfall, GoogleScholarSource};
use research_harvest::utils::{normalize_doi, HttpClient, PaperProgress};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Harvest - find papers on Google Scholar, fetch their PDFs and file them in Zotero
#[derive(Parser, Debug)]
#[command(name = "research-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Literature search, PDF acquisition and Zotero filing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search, fetch PDFs and add every result to Zotero
    Run {
        /// Research question to search for
        question: String,

        /// Maximum number of papers to process
        #[arg(long, default_value_t = 10)]
        max_papers: usize,

        /// Target Zotero collection name
        #[arg(long)]
        collection: Option<String>,

        /// Skip the reference manager
        #[arg(long)]
        no_sink: bool,
    },

    /// Search Google Scholar and print the results as JSON
    #[command(alias = "s")]
    Search {
        /// Search query string
        query: String,

        /// Maximum number of results
        #[arg(long, short, default_value_t = 10)]
        max_results: usize,

        /// Interface language sent with the query
        #[arg(long, default_value = "en")]
        lang: String,
    },

    /// Fetch the PDF for a single DOI
    #[command(alias = "f")]
    Fetch {
        /// DOI, DOI URL or text containing a DOI
        doi: String,

        /// Title used to name the downloaded file
        #[arg(long, default_value = "paper")]
        title: String,
    },

    /// Print the normalized form of a DOI
    Doi {
        /// DOI, DOI URL or text containing a DOI
        text: String,
    },

    /// Fetch PDFs for stored items that have a DOI but no PDF
    Retry {
        /// Zotero collection name (defaults to the configured one)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Link PDFs already in the download directory to stored items
    Link {
        /// Zotero collection name (defaults to the configured one)
        #[arg(long)]
        collection: Option<String>,

        /// Directory to look in (defaults to the download directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Re-scrape authors for stored items whose authors are missing or mangled
    FixAuthors {
        /// Zotero collection name (defaults to the configured one)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

impl Commands {
    fn needs_config(&self) -> bool {
        !matches!(self, Commands::Doi { .. })
    }
}

fn init_tracing(verbose: u8, quiet: bool, logging: &LoggingConfig) -> Result<()> {
    let log_level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if quiet { "error" } else { log_level };

    let file_layer = match logging.resolved_file() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("research_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn http_client(config: &Config) -> Result<Arc<HttpClient>> {
    let client = HttpClient::from_config(&config.http).context("Failed to build HTTP client")?;
    Ok(Arc::new(client))
}

fn library_maintenance(config: &Config, collection: Option<String>) -> LibraryMaintenance {
    let sink: Arc<dyn ReferenceSink> = Arc::new(ZoteroCliSink::new(config.zotero.clone()));
    LibraryMaintenance::new(sink, collection.or_else(|| config.zotero.collection.clone()))
}

fn progress_bar(quiet: bool, total: usize) -> PaperProgress {
    if quiet {
        PaperProgress::hidden()
    } else {
        PaperProgress::new(total)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing configuration file aborts before anything else happens
    let (config, config_path) = if cli.command.needs_config() {
        let (config, path) = resolve_config(cli.config.as_deref())?;
        (config, Some(path))
    } else {
        (Config::default(), None)
    };

    init_tracing(cli.verbose, cli.quiet, &config.logging)?;
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Run {
            question,
            max_papers,
            collection,
            no_sink,
        } => {
            let pipeline = Pipeline::from_config(&config, http_client(&config)?, !no_sink);
            let collection = collection.or_else(|| config.zotero.collection.clone());

            let records = pipeline.search(&question, max_papers).await;
            let progress = progress_bar(cli.quiet, records.len());
            let summary = pipeline
                .process_records(&records, collection.as_deref(), &progress)
                .await;

            println!("{}", summary);
        }

        Commands::Search {
            query,
            max_results,
            lang,
        } => {
            let scholar = GoogleScholarSource::new(http_client(&config)?, config.search.clone());
            let query = SearchQuery::new(query)
                .max_results(max_results)
                .language(lang);
            let results = scholar.search(&query).await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::Fetch { doi, title } => {
            let waterfall = FetchWaterfall::from_config(&config, http_client(&config)?);
            let outcome = waterfall.fetch(&doi, &title).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.is_fetched() {
                std::process::exit(1);
            }
        }

        Commands::Doi { text } => match normalize_doi(&text) {
            Some(doi) => println!("{}", doi),
            None => {
                eprintln!("No valid DOI found in {:?}", text);
                std::process::exit(1);
            }
        },

        Commands::Retry { collection } => {
            let waterfall = FetchWaterfall::from_config(&config, http_client(&config)?);
            let progress = progress_bar(cli.quiet, 0);
            let summary = library_maintenance(&config, collection)
                .retry_missing_pdfs(&waterfall, &progress)
                .await?;
            println!("Retry: {}", summary);
        }

        Commands::Link { collection, dir } => {
            let dir = dir
                .map(|dir| expand_tilde(&dir))
                .unwrap_or_else(|| config.downloads.resolved_directory());
            let summary = library_maintenance(&config, collection)
                .link_local_pdfs(&dir)
                .await?;
            println!("Link: {}", summary);
        }

        Commands::FixAuthors { collection } => {
            let scholar = GoogleScholarSource::new(http_client(&config)?, config.search.clone());
            let summary = library_maintenance(&config, collection)
                .fix_authors(&scholar)
                .await?;
            println!("Fix authors: {}", summary);
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["research-harvest", "-v", "doi", "10.1234/x"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["research-harvest", "doi", "-vv", "10.1234/x"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["research-harvest", "--quiet", "doi", "10.1234/x"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["research-harvest", "run", "graph neural networks"]);
        match cli.command {
            Commands::Run {
                question,
                max_papers,
                collection,
                no_sink,
            } => {
                assert_eq!(question, "graph neural networks");
                assert_eq!(max_papers, 10);
                assert_eq!(collection, None);
                assert!(!no_sink);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_options() {
        let cli = Cli::parse_from([
            "research-harvest",
            "--config",
            "/tmp/rh.toml",
            "run",
            "q",
            "--max-papers",
            "3",
            "--collection",
            "Reading",
            "--no-sink",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rh.toml")));
        match cli.command {
            Commands::Run {
                max_papers,
                collection,
                no_sink,
                ..
            } => {
                assert_eq!(max_papers, 3);
                assert_eq!(collection.as_deref(), Some("Reading"));
                assert!(no_sink);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_default_title() {
        let cli = Cli::parse_from(["research-harvest", "fetch", "doi:10.1234/x"]);
        match cli.command {
            Commands::Fetch { doi, title } => {
                assert_eq!(doi, "doi:10.1234/x");
                assert_eq!(title, "paper");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_only_doi_skips_config() {
        assert!(!Commands::Doi { text: String::new() }.needs_config());
        assert!(Commands::Config.needs_config());
        assert!(Commands::Search {
            query: String::new(),
            max_results: 1,
            lang: "en".to_string(),
        }
        .needs_config());
        assert!(Commands::FixAuthors { collection: None }.needs_config());
    }

    #[test]
    fn test_search_alias() {
        let cli = Cli::parse_from(["research-harvest", "s", "transformers", "-m", "5"]);
        match cli.command {
            Commands::Search {
                max_results, lang, ..
            } => {
                assert_eq!(max_results, 5);
                assert_eq!(lang, "en");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_maintenance_commands() {
        let cli = Cli::parse_from(["research-harvest", "retry", "--collection", "Reading"]);
        assert!(matches!(
            cli.command,
            Commands::Retry { collection: Some(ref c) } if c == "Reading"
        ));

        let cli = Cli::parse_from(["research-harvest", "link", "--dir", "~/pdfs"]);
        match cli.command {
            Commands::Link { collection, dir } => {
                assert_eq!(collection, None);
                assert_eq!(dir, Some(PathBuf::from("~/pdfs")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["research-harvest", "fix-authors"]);
        assert!(matches!(cli.command, Commands::FixAuthors { collection: None }));
    }
}
