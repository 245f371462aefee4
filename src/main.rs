//! spaece-insights - SPAECE education results dashboard
//!
//! Authenticates an entity (state, CREDE, municipality or school), restricts
//! the result dataset to what that entity may see, computes indicators and
//! renders them, with optional CSV exports and an AI narrative.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, dataset, directory, output)
//!   3 - Authentication failure

mod analysis;
mod cli;
mod config;
mod dataset;
mod directory;
mod error;
mod models;
mod narrative;
mod report;

use analysis::{compare_with_ancestors, compute_indicators, select_for_entity};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use dataset::remote::RemoteSource;
use dataset::{Dataset, FacetOptions, HierarchyCodes};
use directory::{EntityDirectory, StaticDirectory};
use indicatif::{ProgressBar, ProgressStyle};
use models::Entity;
use narrative::{ChatCompletionClient, ClientConfig, NarrativePanel};
use report::{Report, ReportMetadata};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const EXIT_AUTH_FAILURE: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("spaece-insights v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run_dashboard(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .spaece-insights.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to point at your dataset, entity directory and AI endpoint.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `[general].verbose` raises the default level unless `--quiet` is given.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one dashboard invocation. Returns the exit code.
///
/// Status lines go to stderr so that stdout carries only the report.
async fn run_dashboard(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Authenticate
    let directory = StaticDirectory::load(&config.directory.path)?;
    debug!(
        "{} entities in {}",
        directory.len(),
        config.directory.path.display()
    );
    let code = args.code.as_deref().unwrap_or_default().trim();
    let password = args.password.as_deref().unwrap_or_default();

    let entity = match directory.authenticate(code, password) {
        Ok(entity) => entity,
        Err(e) => {
            warn!("{}", e);
            eprintln!("\n⛔ {}", e.user_message());
            return Ok(EXIT_AUTH_FAILURE);
        }
    };
    eprintln!("🔐 {} ({})", entity.name, entity.role());

    // Step 2: Load the dataset
    let (dataset, source) = load_dataset(&args, &config).await?;

    if args.list_options {
        handle_list_options(&dataset, &entity);
        return Ok(0);
    }

    // Step 3: Scope the rows
    let filters = args.filters();
    if filters.is_empty() {
        debug!("No filters selected");
    } else {
        debug!("Filters: {:?}", filters);
    }
    let selection = select_for_entity(dataset.rows(), &entity, &filters);
    for ignored in &selection.ignored {
        eprintln!("⚠️  {}", ignored.user_message());
    }

    // Step 4: Indicators
    let requested = args.requested_indicators();
    let indicators = compute_indicators(&selection.rows, &requested);
    if indicators.is_empty() {
        eprintln!("ℹ️  Nenhum registro para os filtros selecionados.");
    }

    let comparison = if config.report.include_comparison {
        compare_with_ancestors(dataset.rows(), &entity, &filters, &requested)
    } else {
        Vec::new()
    };

    // Step 5: Narrative (optional; never alters the indicators)
    let narrative = if args.narrative {
        let summary = narrative::build_summary(&entity, &filters, &indicators, &comparison);
        Some(run_narrative(&args, &config, &summary).await)
    } else {
        None
    };

    // Step 6: Exports
    if let Some(ref path) = args.export_rows {
        report::write_rows_csv(path, &selection.rows)?;
        eprintln!("💾 Rows exported to {}", path.display());
    }
    if let Some(ref path) = args.export_indicators {
        report::write_indicators_csv(path, &indicators)?;
        eprintln!("💾 Indicators exported to {}", path.display());
    }

    // Step 7: Report
    let report = Report {
        metadata: ReportMetadata {
            entity,
            generated_at: Utc::now(),
            source,
            rows_loaded: dataset.len(),
            rows_skipped: dataset.skipped(),
            rows_visible: selection.rows.len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        filters,
        ignored_filters: report::generator::ignored_messages(&selection.ignored),
        indicators,
        comparison,
        narrative,
    };

    let output = match config.report.format {
        OutputFormat::Table => report::generate_table_report(&report),
        OutputFormat::Markdown => report::generate_markdown_report(&report),
        OutputFormat::Json => report::generate_json_report(&report)?,
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(0)
}

/// Load rows from the results API or from a local file.
async fn load_dataset(args: &Args, config: &Config) -> Result<(Dataset, String)> {
    if let Some(ref aggregate) = args.aggregate {
        if config.dataset.api_indicators.is_empty() {
            bail!("No indicator codes configured for the results API ([dataset].api_indicators)");
        }

        let source = RemoteSource {
            url: config.dataset.api_url.clone(),
            timeout_seconds: config.dataset.timeout_seconds,
            indicators: config.dataset.api_indicators.clone(),
            edition: config.dataset.edition,
            installation_id: config.dataset.installation_id.clone(),
            session_token: args.session_token.clone().map(SecretString::from),
        };

        eprintln!("📥 Fetching aggregate {} from the results API...", aggregate);
        let dataset = source.fetch(aggregate).await?;
        return Ok((dataset, source.url));
    }

    let path = config
        .dataset
        .path
        .clone()
        .context("No dataset given: use --data, SPAECE_DATA or [dataset].path")?;

    eprintln!("📥 Loading {}", path.display());
    let dataset = Dataset::load(&path)?;
    if dataset.skipped() > 0 {
        warn!("{} records were skipped while loading", dataset.skipped());
    }

    Ok((dataset, path.display().to_string()))
}

/// Handle --list-options: print the filter values visible to this login.
fn handle_list_options(dataset: &Dataset, entity: &Entity) {
    let visible = dataset.select(|row| entity.scope.contains(row));
    let codes = HierarchyCodes::from_rows(visible.iter().copied());
    let options = FacetOptions::from_rows(visible.iter().copied());

    fn line<T: std::fmt::Display>(label: &str, values: impl IntoIterator<Item = T>) {
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if values.is_empty() {
            println!("   {}: -", label);
        } else {
            println!("   {}: {}", label, values.join(", "));
        }
    }

    println!("\n🔎 Filtros disponíveis para {} ({} registros):\n", entity.name, visible.len());
    line("CREDE", &codes.regions);
    line("Município", &codes.municipalities);
    line("Escola", &codes.schools);
    line("Etapa", &options.stages);
    line("Componente", &options.subjects);
    line("Rede", &options.networks);
    line("Edição", &options.years);
    line("NSE", &options.socioeconomic_levels);
    line("Sexo", &options.genders);
    line("Raça/Cor", &options.races);
}

/// Request the narrative, folding every failure into the panel state.
async fn run_narrative(args: &Args, config: &Config, summary: &str) -> NarrativePanel {
    let Some(api_key) = args.api_key.clone().filter(|k| !k.is_empty()) else {
        warn!("--narrative requested without an API key");
        return NarrativePanel::Unavailable(
            "Análise indisponível: GROQ_API_KEY não configurada".to_string(),
        );
    };

    let client_config = ClientConfig {
        api_url: config.narrative.api_url.clone(),
        model: config.narrative.model.clone(),
        api_key: SecretString::from(api_key),
        temperature: config.narrative.temperature,
        max_tokens: config.narrative.max_tokens,
        timeout_seconds: config.narrative.timeout_seconds,
    };

    let client = match ChatCompletionClient::new(client_config) {
        Ok(client) => client,
        Err(e) => {
            warn!("Narrative client unavailable: {:#}", e);
            return NarrativePanel::Unavailable("Análise indisponível".to_string());
        }
    };

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!(
        "Gerando análise com {} (até {}s)...",
        config.narrative.model, config.narrative.timeout_seconds
    ));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let panel = narrative::narrate(&client, summary).await;

    spinner.finish_and_clear();
    if panel.is_ready() {
        info!("Narrative received from {}", config.narrative.model);
    }
    panel
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems with the default file are
/// reported on stderr directly. Returns the path the config came from.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, Some(PathBuf::from(DEFAULT_CONFIG_FILE)))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok((Config::default(), None))
        }
    }
}
