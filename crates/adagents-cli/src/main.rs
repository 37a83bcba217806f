//! Agent Authorization Registry CLI
//!
//! The `adagents` command crawls publisher `/.well-known/adagents.json`
//! documents into a local index file and answers authorization queries
//! against it.
//!
//! ## Commands
//!
//! - `crawl`: Run one crawl pass over the agent roster and persist the index
//! - `lookup`: List agents authorized to sell a publisher domain
//! - `check`: Point authorization check for one agent and identifier
//! - `product`: Validate an agent against product selectors
//! - `validate`: Fetch and validate one publisher document ad hoc
//! - `report`: Deployment coverage report for a publisher
//!
//! Every invocation loads the index snapshot named by `--index`; `crawl`
//! writes it back, so queries work offline against the last crawl.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use federated_index::{
    AgentType, FederatedIndex, IdentifierType, IndexSnapshot, MemoryIndex, SelectorExpression,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use adagents_core::{
    validate_domain, AgentRoster, CapabilityDiscovery, CrawlScheduler, DeploymentTracker,
    DocumentFetcher, FileRoster, HttpFetcher, RegistryConfig, DEFAULT_PROFILE_TTL,
};

#[derive(Parser)]
#[command(name = "adagents")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Federated agent authorization registry", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Index snapshot file read by queries and written by `crawl`
    #[arg(long, global = true, default_value = ".adagents/index.json")]
    index: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one crawl pass over the agent roster and persist the index
    Crawl {
        /// Agent roster file (JSON array of {url, name?, agent_type?, protocol?})
        #[arg(short, long, default_value = "roster.json")]
        roster: PathBuf,

        /// Maximum concurrent publisher fetches (default: env or 8)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-request timeout in seconds (default: env or 5)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List known agents
    Agents {
        /// Filter by agent type (sales, creative, signals)
        #[arg(short = 't', long = "type")]
        agent_type: Option<String>,
    },

    /// List crawled publishers and their document state
    Publishers,

    /// List agents authorized to sell a publisher domain
    Lookup {
        /// Publisher domain (e.g. example.com)
        domain: String,
    },

    /// Check whether an agent is authorized for one property identifier
    Check {
        /// Agent endpoint URL
        agent: String,

        /// Identifier value (domain name, app bundle id, ...)
        value: String,

        /// Identifier type
        #[arg(short = 't', long = "type", default_value = "domain")]
        identifier_type: String,
    },

    /// Validate an agent against product selectors from a JSON file
    Product {
        /// Agent endpoint URL
        agent: String,

        /// Selector JSON file (array of selector expressions)
        #[arg(short, long)]
        selectors: PathBuf,
    },

    /// Fetch and validate one publisher document without touching the index
    Validate {
        /// Publisher domain to fetch
        domain: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Deployment coverage report for a publisher
    Report {
        /// Publisher domain
        domain: String,

        /// Expected agent URL (repeatable)
        #[arg(long = "expect")]
        expected: Vec<String>,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Show aggregate index statistics
    Stats,

    /// Show recent crawl runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    adagents_core::init_tracing(cli.json, level);

    let index_path = cli.index;

    match cli.command {
        Commands::Crawl {
            roster,
            concurrency,
            timeout,
        } => cmd_crawl(&index_path, &roster, concurrency, timeout).await,
        Commands::Agents { agent_type } => cmd_agents(&index_path, agent_type.as_deref()).await,
        Commands::Publishers => cmd_publishers(&index_path).await,
        Commands::Lookup { domain } => cmd_lookup(&index_path, &domain).await,
        Commands::Check {
            agent,
            value,
            identifier_type,
        } => cmd_check(&index_path, &agent, &value, &identifier_type).await,
        Commands::Product { agent, selectors } => {
            cmd_product(&index_path, &agent, &selectors).await
        }
        Commands::Validate { domain, timeout } => cmd_validate(&domain, timeout).await,
        Commands::Report {
            domain,
            expected,
            timeout,
        } => cmd_report(&index_path, &domain, &expected, timeout).await,
        Commands::Stats => cmd_stats(&index_path).await,
        Commands::Runs { limit } => cmd_runs(&index_path, limit).await,
    }
}

/// Load the index snapshot, or start empty when the file does not exist.
fn load_index(path: &Path) -> Result<Arc<MemoryIndex>> {
    let index = MemoryIndex::new();
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index file: {:?}", path))?;
        let snapshot: IndexSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Invalid index file: {:?}", path))?;
        index
            .load_snapshot(snapshot)
            .context("Failed to load index snapshot")?;
    }
    Ok(Arc::new(index))
}

/// Persist the index snapshot, creating parent directories as needed.
fn save_index(path: &Path, index: &MemoryIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create index directory: {:?}", parent))?;
        }
    }
    let json = serde_json::to_string_pretty(&index.snapshot())?;
    std::fs::write(path, json).with_context(|| format!("Failed to write index file: {:?}", path))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn parse_agent_type(raw: &str) -> Result<AgentType> {
    match raw.trim().to_lowercase().as_str() {
        "sales" => Ok(AgentType::Sales),
        "creative" => Ok(AgentType::Creative),
        "signals" => Ok(AgentType::Signals),
        _ => anyhow::bail!(
            "Unknown agent type: {} (expected sales, creative, or signals)",
            raw
        ),
    }
}

/// Run one crawl pass over the agent roster and persist the index
async fn cmd_crawl(
    index_path: &Path,
    roster_path: &Path,
    concurrency: Option<usize>,
    timeout: Option<u64>,
) -> Result<()> {
    let mut config = RegistryConfig::from_env().with_roster(roster_path);
    if let Some(n) = concurrency {
        config = config.with_concurrency(n);
    }
    if let Some(secs) = timeout {
        config = config.with_timeout_secs(secs);
    }

    let agents = FileRoster::new(roster_path)
        .list_agents(None)
        .await
        .with_context(|| format!("Failed to read roster: {:?}", roster_path))?;

    let index = load_index(index_path)?;
    let fetcher: Arc<dyn DocumentFetcher> = Arc::new(
        HttpFetcher::new(config.fetch_timeout(), &config.user_agent)
            .context("Failed to build HTTP client")?,
    );
    let scheduler = CrawlScheduler::new(fetcher, index.clone(), config.crawl_config());

    info!(roster = ?roster_path, agents = agents.len(), "starting crawl");
    let run = scheduler
        .crawl_all_agents(&agents)
        .await
        .context("Crawl failed to start")?;

    println!("Run:       {}", run.run_id);
    println!("Status:    {:?}", run.status);
    println!("Attempted: {}", run.agents_attempted);
    println!("Succeeded: {}", run.agents_succeeded);
    println!("Failed:    {}", run.agents_failed);
    println!("Unchanged: {}", run.publishers_unchanged);
    println!("Duration:  {}ms", run.duration_ms());

    if !run.errors.is_empty() {
        println!("\nErrors:");
        for failure in &run.errors {
            if failure.agent_url.is_empty() {
                println!("  - {}", failure.error);
            } else {
                println!("  - {}: {}", failure.agent_url, failure.error);
            }
        }
    }

    save_index(index_path, &index)?;

    let stats = index.get_stats().await?;
    println!(
        "\nIndex: {} agents, {} publishers, {} properties",
        stats.agent_count, stats.publisher_count, stats.property_count
    );
    println!("Saved index to {:?}", index_path);

    Ok(())
}

/// List known agents
async fn cmd_agents(index_path: &Path, agent_type: Option<&str>) -> Result<()> {
    let filter = match agent_type {
        Some(raw) => Some(parse_agent_type(raw)?),
        None => None,
    };

    let index = load_index(index_path)?;
    let agents = index.list_all_agents(filter).await?;

    if agents.is_empty() {
        println!("No agents in the index. Run 'adagents crawl' first.");
        return Ok(());
    }

    for agent in &agents {
        println!(
            "  [{}] {} ({:?})  {}",
            agent.agent_type,
            agent.url,
            agent.source,
            agent.name.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} agents", agents.len());

    Ok(())
}

/// List crawled publishers and their document state
async fn cmd_publishers(index_path: &Path) -> Result<()> {
    let index = load_index(index_path)?;
    let publishers = index.list_all_publishers().await?;

    if publishers.is_empty() {
        println!("No publishers crawled yet. Run 'adagents crawl' first.");
        return Ok(());
    }

    for publisher in &publishers {
        let validated = publisher
            .last_validated_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} [{:?}] agents: {} properties: {} validated: {}",
            publisher.domain,
            publisher.validation_status,
            publisher.authorized_agents.len(),
            publisher.properties.len(),
            validated
        );
    }
    println!("\n{} publishers", publishers.len());

    Ok(())
}

/// List agents authorized to sell a publisher domain
async fn cmd_lookup(index_path: &Path, domain: &str) -> Result<()> {
    let index = load_index(index_path)?;
    let agents = index.lookup_domain(domain).await?;

    if agents.is_empty() {
        println!("No agents authorized for {}", domain);
        return Ok(());
    }

    println!("{} agent(s) authorized for {}:", agents.len(), domain);
    for agent in &agents {
        println!("  {} [{}]", agent.url, agent.agent_type);
    }

    Ok(())
}

/// Check whether an agent is authorized for one property identifier
async fn cmd_check(
    index_path: &Path,
    agent: &str,
    value: &str,
    identifier_type: &str,
) -> Result<()> {
    let id_type = IdentifierType::parse(identifier_type)
        .with_context(|| format!("Unknown identifier type: {}", identifier_type))?;

    let index = load_index(index_path)?;
    let check = index
        .is_property_authorized_for_agent(agent, id_type, value)
        .await?;

    if check.authorized {
        println!(
            "AUTHORIZED: {} may transact on {} {}",
            agent,
            id_type.as_str(),
            value
        );
        if let Some(property) = check.property {
            println!(
                "  via {} property '{}' of {}",
                property.property_type.as_str(),
                property.name.as_deref().unwrap_or("unnamed"),
                property.publisher_domain
            );
        }
    } else {
        println!(
            "NOT AUTHORIZED: {} for {} {}",
            agent,
            id_type.as_str(),
            value
        );
    }

    Ok(())
}

/// Validate an agent against product selectors from a JSON file
async fn cmd_product(index_path: &Path, agent: &str, selectors_path: &Path) -> Result<()> {
    let selectors: Vec<SelectorExpression> = read_json_file(selectors_path)?;
    if selectors.is_empty() {
        anyhow::bail!("Selector file is empty: {:?}", selectors_path);
    }

    let index = load_index(index_path)?;
    let authorization = index.validate_agent_for_product(agent, &selectors).await?;

    println!(
        "{}: {} against {} selector(s)",
        if authorization.authorized {
            "AUTHORIZED"
        } else {
            "NOT AUTHORIZED"
        },
        agent,
        selectors.len()
    );

    if !authorization.matched_properties.is_empty() {
        println!("\nMatched properties:");
        for property in &authorization.matched_properties {
            println!(
                "  + {} ({}) via {}",
                property.name.as_deref().unwrap_or("unnamed"),
                property.property_type.as_str(),
                property.publisher_domain
            );
        }
    }

    if !authorization.unmatched_selectors.is_empty() {
        println!("\nUnmatched selectors:");
        for selector in &authorization.unmatched_selectors {
            println!("  - {}", selector);
        }
    }

    Ok(())
}

/// Fetch and validate one publisher document without touching the index
async fn cmd_validate(domain: &str, timeout: u64) -> Result<()> {
    let config = RegistryConfig::from_env().with_timeout_secs(timeout);
    let fetcher = HttpFetcher::new(config.fetch_timeout(), &config.user_agent)
        .context("Failed to build HTTP client")?;

    let result = validate_domain(&fetcher, domain).await;

    let status = result
        .status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Fetched {} (status {})",
        adagents_core::adagents_url(domain),
        status
    );
    println!(
        "Document: {}",
        if result.valid { "VALID" } else { "INVALID" }
    );

    if let Some(document) = &result.document {
        println!(
            "  {} agent(s), {} propert{}",
            document.authorized_agents.len(),
            document.properties.len(),
            if document.properties.len() == 1 {
                "y"
            } else {
                "ies"
            }
        );
    }
    if !result.errors.is_empty() {
        println!("\nErrors:");
        for issue in &result.errors {
            println!("  - {}", issue);
        }
    }
    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for issue in &result.warnings {
            println!("  - {}", issue);
        }
    }

    Ok(())
}

/// Deployment coverage report for a publisher
async fn cmd_report(
    index_path: &Path,
    domain: &str,
    expected: &[String],
    timeout: u64,
) -> Result<()> {
    if expected.is_empty() {
        anyhow::bail!("Provide at least one --expect <agent-url>");
    }

    let config = RegistryConfig::from_env().with_timeout_secs(timeout);
    let fetcher: Arc<dyn DocumentFetcher> = Arc::new(
        HttpFetcher::new(config.fetch_timeout(), &config.user_agent)
            .context("Failed to build HTTP client")?,
    );
    let index = load_index(index_path)?;
    let discovery = Arc::new(CapabilityDiscovery::new(fetcher, DEFAULT_PROFILE_TTL));
    let tracker = DeploymentTracker::new(index, discovery);

    let report = tracker
        .report(domain, expected)
        .await
        .context("Deployment report failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Show aggregate index statistics
async fn cmd_stats(index_path: &Path) -> Result<()> {
    let index = load_index(index_path)?;
    let stats = index.get_stats().await?;

    println!(
        "Agents:     {} (registered {}, discovered {})",
        stats.agent_count, stats.by_source.registered, stats.by_source.discovered
    );
    println!("Publishers: {}", stats.publisher_count);
    println!("Properties: {}", stats.property_count);
    println!("Edges:      {}", stats.edge_count);
    match stats.last_crawl_finished_at {
        Some(finished) => println!("Last crawl: {}", finished.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last crawl: never"),
    }

    Ok(())
}

/// Show recent crawl runs
async fn cmd_runs(index_path: &Path, limit: usize) -> Result<()> {
    let index = load_index(index_path)?;
    let runs = index.recent_crawl_runs(limit).await?;

    if runs.is_empty() {
        println!("No crawl runs recorded yet.");
        return Ok(());
    }

    for run in &runs {
        println!(
            "{} {:?} attempted={} succeeded={} failed={} unchanged={} ({}ms)",
            run.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.status,
            run.agents_attempted,
            run.agents_succeeded,
            run.agents_failed,
            run.publishers_unchanged,
            run.duration_ms()
        );
    }

    Ok(())
}
