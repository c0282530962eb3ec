//! # seo-auditor CLI
//!
//! Command-line interface for crawling a website and auditing the result.
//!
//! ## Subcommands
//!
//! - `crawl`: polite sequential crawl into a session directory
//! - `audit`: LLM-assisted Markdown audit of a session directory or page file
//! - `score`: deterministic scores and issues without any model call
//!
//! Logging goes to stderr (`-v` raises the level, `RUST_LOG` overrides it) and
//! optionally to a file with `--log-file`. Reports go to stdout unless
//! `--output` names a file.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rig::completion::CompletionModel;
use seo_auditor::config::{AuditOptions, AuditSource, ProviderConfig};
use seo_auditor::context::{AuditContext, AuditMode, ContextBuilder};
use seo_auditor::crawler::storage::{available_languages, load_page_file, load_session_dir};
use seo_auditor::crawler::{CrawlProgress, Crawler, CrawlerConfig, HttpFetcher, Language, PageRecord, StopSignal};
use seo_auditor::model::{AuditClient, DEFAULT_CLOUD_URL, DEFAULT_LOCAL_URL, ProviderKind};
use seo_auditor::report::{GeneratorConfig, Report, ReportGenerator};
use seo_auditor::scoring::{ScoringRubric, detect_issues};
use tracing::{info, instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Crawl a website, score its SEO signals and write an LLM-assisted audit", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a website and store one record per page
    Crawl(CrawlArgs),

    /// Write an SEO audit report from a crawl session or a page file
    Audit(AuditArgs),

    /// Print deterministic scores and issues of a crawl session or a page file
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Seed URL
    #[arg(required = true)]
    url: String,

    /// Maximum number of pages to fetch successfully
    #[arg(short = 'p', long, default_value = "50")]
    max_pages: usize,

    /// Maximum link depth from the seed
    #[arg(short = 'd', long)]
    max_depth: Option<u32>,

    /// Minimum delay between requests in milliseconds
    #[arg(long, default_value = "500")]
    delay_ms: u64,

    /// Timeout of a single fetch in seconds
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// Retries for network failures
    #[arg(long, default_value = "1")]
    retries: u32,

    /// Root directory for crawl sessions
    #[arg(short, long, default_value = "crawl_data")]
    output_dir: PathBuf,

    /// Rewrite the session summary after this many fetches
    #[arg(long, default_value = "10")]
    summary_every: usize,

    /// User agent sent with every request
    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Crawl session directory or single page file
    #[arg(required = true)]
    path: PathBuf,

    /// Audit type; a page file always gets a single-page audit
    #[arg(short, long, default_value = "full", value_parser = ["overview", "technical", "pages", "full"])]
    mode: String,

    /// Only audit pages in this language (el, en, fr, de, es, it)
    #[arg(short, long)]
    language: Option<String>,

    /// Completion provider
    #[arg(long, default_value = "local", value_parser = ["local", "cloud"])]
    provider: String,

    /// Model name, defaults to the provider's default model
    #[arg(long)]
    model: Option<String>,

    /// Local model server URL
    #[arg(long, default_value = DEFAULT_LOCAL_URL)]
    local_url: String,

    /// Cloud API key, defaults to OPENAI_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// Cloud API base URL
    #[arg(long, default_value = DEFAULT_CLOUD_URL)]
    base_url: String,

    /// Timeout of a single completion call in seconds
    #[arg(short, long, default_value = "180")]
    timeout: u64,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum bytes of one overflow chunk
    #[arg(long)]
    chunk_bytes: Option<usize>,

    /// Byte budget of the main audit context
    #[arg(long)]
    budget_bytes: Option<usize>,

    /// Maximum number of pages shown with full detail
    #[arg(long)]
    page_cap: Option<usize>,

    /// List the crawled languages of the session and exit
    #[arg(long)]
    list_languages: bool,

    /// Do not check the provider before the audit
    #[arg(long)]
    skip_check: bool,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Crawl session directory or single page file
    #[arg(required = true)]
    path: PathBuf,

    /// Only score pages in this language
    #[arg(short, long)]
    language: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = telemetry::init_tracing_subscriber(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Some(Commands::Crawl(args)) => crawl_command(args).await?,
        Some(Commands::Audit(args)) => audit_command(args).await?,
        Some(Commands::Score(args)) => score_command(args).await?,
        None => {
            let _ = Cli::parse_from(["seo-auditor", "--help"]);
        }
    }

    Ok(())
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(message.into());
    spinner
}

#[instrument]
async fn crawl_command(args: CrawlArgs) -> anyhow::Result<()> {
    let mut builder = CrawlerConfig::builder()
        .max_pages(args.max_pages)
        .max_depth(args.max_depth)
        .delay_ms(args.delay_ms)
        .timeout_secs(args.timeout)
        .fetch_retries(args.retries)
        .summary_interval(args.summary_every)
        .output_dir(args.output_dir);
    if let Some(user_agent) = args.user_agent {
        builder = builder.user_agent(user_agent);
    }
    let config = builder.build();

    let stop = StopSignal::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing the current page");
                stop.stop();
            }
        }
    });

    let progress = spinner(format!("Crawling {}...", args.url));
    let callback = {
        let progress = progress.clone();
        Arc::new(move |p: CrawlProgress| {
            progress.set_message(format!(
                "{}/{} pages, {} failed, {} queued: {}",
                p.fetched, p.max_pages, p.failed, p.pending, p.url
            ));
        })
    };

    let fetcher = HttpFetcher::new(&config)?;
    let crawler = Crawler::new(fetcher, config.clone())
        .with_progress_callback(callback)
        .with_stop_signal(stop);
    let result = crawler.run(&args.url, config.max_pages).await;
    progress.finish_and_clear();
    let session = result?;

    let summary = session.summary();
    println!(
        "Crawled {} pages of {} ({} failed{})",
        summary.total_pages,
        summary.domain,
        summary.error_count,
        if session.completed { "" } else { ", stopped early" }
    );
    for (language, stats) in &summary.languages {
        println!("  {language}: {} pages", stats.pages);
    }
    println!(
        "  average load time {:.0} ms, {} slow pages (performance {:.1})",
        summary.average_load_time_ms,
        summary.performance.slow_pages_over_3s,
        summary.performance.performance_score
    );
    if let Some(dir) = &session.output_dir {
        println!("Session saved to {}", dir.display());
    }
    Ok(())
}

/// Page records of a session directory or a single page file
async fn load_records(path: &Path, language: Option<Language>) -> anyhow::Result<Vec<PageRecord>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("path not found: {}", path.display()))?;
    if metadata.is_file() {
        Ok(vec![load_page_file(path).await?])
    } else {
        Ok(load_session_dir(path, language).await?.audit_records())
    }
}

#[instrument]
async fn audit_command(args: AuditArgs) -> anyhow::Result<()> {
    if args.list_languages {
        let languages = available_languages(&args.path).await?;
        println!("Crawled languages in {}:", args.path.display());
        for language in languages {
            println!("  {} ({})", language.code(), language.name());
        }
        return Ok(());
    }

    let options = AuditOptions {
        path: args.path,
        mode: args.mode.parse::<AuditMode>().map_err(anyhow::Error::msg)?,
        language: args.language,
        provider: match args.provider.as_str() {
            "cloud" => ProviderKind::Cloud,
            _ => ProviderKind::Local,
        },
        model: args.model,
        local_url: args.local_url,
        api_key: args.api_key,
        base_url: args.base_url,
        timeout_secs: args.timeout,
        output: args.output,
        budget_bytes: args.budget_bytes,
        chunk_bytes: args.chunk_bytes,
        page_cap: args.page_cap,
    };
    let mut settings = options.validate().await?;

    if !args.skip_check {
        let checking = spinner(format!("Checking {} provider...", settings.provider.kind()));
        let checked = settings.provider.clone().check(&reqwest::Client::new()).await;
        checking.finish_and_clear();
        settings.provider = checked?;
    }

    let records = match &settings.source {
        AuditSource::Page(path) => vec![load_page_file(path).await?],
        AuditSource::Session(dir) => load_session_dir(dir, settings.language).await?.audit_records(),
    };
    info!(records = records.len(), "pages loaded");

    let context = ContextBuilder::new(settings.context.clone(), ScoringRubric::default()).build(
        &records,
        settings.mode,
        settings.budget,
    )?;
    info!(
        included = context.metadata.included.len(),
        omitted = context.metadata.omitted.len(),
        chunks = context.chunks.len(),
        bytes = context.metadata.payload_bytes,
        "audit context built"
    );

    let generator = settings.generator.clone();
    let report = match &settings.provider {
        ProviderConfig::Local { url, model } => {
            generate(AuditClient::local(url, model), generator, context).await?
        }
        ProviderConfig::Cloud {
            api_key,
            base_url,
            model,
        } => generate(AuditClient::cloud(api_key, base_url, model), generator, context).await?,
    };

    match &settings.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &report.markdown).await?;
            println!(
                "Report saved to {} (score {:.1}, {}, {} pages omitted for brevity)",
                path.display(),
                report.score.overall,
                report.band,
                report.metadata.omitted_for_brevity()
            );
        }
        None => println!("{}", report.markdown),
    }
    Ok(())
}

async fn generate<M: CompletionModel>(
    client: AuditClient<M>,
    config: GeneratorConfig,
    context: AuditContext,
) -> anyhow::Result<Report> {
    let progress = spinner(format!("Generating {} audit with {}...", context.mode, client.info()));
    let result = ReportGenerator::new(client, config).generate(context).await;
    progress.finish_and_clear();
    Ok(result?)
}

#[instrument]
async fn score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let language = args
        .language
        .as_deref()
        .map(str::parse::<Language>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let records = load_records(&args.path, language).await?;
    let rubric = ScoringRubric::default();
    let aggregate = rubric.score_pages(&records);

    if args.json {
        let pages: Vec<_> = records
            .iter()
            .filter(|r| !r.is_failed())
            .map(|r| {
                serde_json::json!({
                    "url": r.url,
                    "language": r.language,
                    "score": rubric.score_page(r),
                    "issues": detect_issues(r)
                        .iter()
                        .map(|i| i.message.clone())
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "score": aggregate,
            "band": aggregate.band(),
            "pages": pages,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Overall {:.1} / 100 ({}) across {} pages",
        aggregate.overall,
        aggregate.band(),
        aggregate.pages
    );
    for (name, score) in aggregate.categories() {
        println!("  {name:<22} {score:>5.1}");
    }
    println!();
    for record in &records {
        if record.is_failed() {
            println!(
                "  failed  {} ({})",
                record.url,
                record.error.as_deref().unwrap_or_default()
            );
            continue;
        }
        let score = rubric.score_page(record);
        let issues = detect_issues(record);
        println!("{:>6.1}  {} ({} issues)", score.overall, record.url, issues.len());
        for issue in issues {
            println!("          - {}", issue.message);
        }
    }
    Ok(())
}
