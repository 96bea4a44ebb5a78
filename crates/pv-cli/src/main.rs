use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use pv_analysis::curve::{multiplier_curve, CurvePoint, CURVE_SAMPLES};
use pv_analysis::enrich::DEFAULT_REG_SYMBOL;
use pv_analysis::voting::{filter_by_owner, owner_position_counts, score_positions, ModelSummary, ScoreTable};
use pv_analysis::{EnrichedPosition, EnrichmentResult, EnrichmentWarning, Formula, ModelRegistry, PositionEnricher, Value, Variables};
use pv_data::subgraph::parse_positions_response;
use pv_data::types::RawPosition;
use pv_data::SubgraphClient;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Owners shown in the owner table.
const TOP_OWNERS: usize = 10;

#[derive(Debug, Clone)]
struct AppContext {
    api_key: Option<String>,
    subgraph_url: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "powervoting")]
#[command(about = "Voting power analysis for concentrated-liquidity positions")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a pool's positions and score them with every model.
    Analyze(AnalyzeArgs),
    /// Manage the models file.
    Models(ModelsArgs),
    /// Sample a formula's multiplier across a price range.
    Curve(CurveArgs),
    /// Evaluate a formula once.
    Eval(EvalArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Pool address to query.
    #[arg(long, required_unless_present = "input")]
    pool: Option<String>,

    /// Saved subgraph response to analyze instead of querying.
    #[arg(long, conflicts_with = "pool")]
    input: Option<PathBuf>,

    /// Only show positions held by this address.
    #[arg(long)]
    owner: Option<String>,

    /// Models file; the default model alone when omitted.
    #[arg(long)]
    models: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_REG_SYMBOL)]
    reg_symbol: String,

    /// Full subgraph URL, overriding PV_SUBGRAPH_URL and THEGRAPH_API_KEY.
    #[arg(long)]
    subgraph_url: Option<String>,

    /// Output format: table (default), json or csv.
    #[arg(long, default_value = "table")]
    output: String,
}

#[derive(Args, Debug)]
struct ModelsArgs {
    /// Models file to read and update.
    #[arg(long, default_value = "models.json")]
    file: PathBuf,

    #[command(subcommand)]
    action: ModelsAction,
}

#[derive(Subcommand, Debug)]
enum ModelsAction {
    List,
    Show {
        id: String,
    },
    /// Add a model; omitted fields take the new-model defaults.
    Add {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        formula: Option<String>,
    },
    /// Change a model; omitted fields keep their value.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        formula: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Print the models document, or write it to --out.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge models from another document under fresh ids.
    Import {
        from: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CurveArgs {
    #[arg(long)]
    formula: String,

    #[arg(long)]
    min: f64,

    #[arg(long)]
    max: f64,

    #[arg(long)]
    current: f64,

    #[arg(long, default_value_t = CURVE_SAMPLES)]
    samples: usize,

    /// Output format: table (default), json or csv.
    #[arg(long, default_value = "table")]
    output: String,
}

#[derive(Args, Debug)]
struct EvalArgs {
    #[arg(long)]
    formula: String,

    #[arg(long)]
    reg_amount: f64,

    #[arg(long, default_value_t = 0.0)]
    reg_equivalent: f64,

    /// Extra variable as name=value; `true`/`false` bind 1/0.
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, Value)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        api_key: std::env::var("THEGRAPH_API_KEY").ok(),
        subgraph_url: std::env::var("PV_SUBGRAPH_URL").ok(),
    };

    match cli.command {
        Commands::Analyze(args) => handle_analyze(&ctx, args).await,
        Commands::Models(args) => handle_models(args).await,
        Commands::Curve(args) => handle_curve(args),
        Commands::Eval(args) => handle_eval(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn handle_analyze(ctx: &AppContext, args: AnalyzeArgs) -> Result<()> {
    let registry = match &args.models {
        Some(path) => load_registry(path, false).await?,
        None => ModelRegistry::new(),
    };

    let raw = load_positions(ctx, &args).await?;
    let enrichment = PositionEnricher::new(&args.reg_symbol).enrich(&raw);

    if enrichment.is_empty() {
        println!("No active liquidity positions found");
        return Ok(());
    }

    let owners = owner_position_counts(&enrichment.positions);
    let positions = match &args.owner {
        Some(owner) => filter_by_owner(&enrichment.positions, owner),
        None => enrichment.positions.clone(),
    };
    if positions.is_empty() {
        println!(
            "No positions found for owner {}",
            args.owner.as_deref().unwrap_or_default()
        );
        return Ok(());
    }

    let scores = score_positions(&registry, &positions);
    let report = AnalysisReport {
        enrichment: &enrichment,
        owners: &owners,
        positions: &positions,
        scores: &scores,
        reg_symbol: &args.reg_symbol,
    };

    match args.output.to_lowercase().as_str() {
        "table" => print_analysis_table(&report),
        "json" => println!("{}", analysis_json(&report)?),
        "csv" => {
            for line in analysis_csv(&report) {
                println!("{line}");
            }
        }
        _ => {
            return Err(eyre!(
                "unknown output format '{}'; use 'table', 'json', or 'csv'",
                args.output
            ))
        }
    }

    info!(
        positions = positions.len(),
        models = registry.len(),
        output = %args.output,
        "analyze command completed"
    );

    Ok(())
}

async fn load_positions(ctx: &AppContext, args: &AnalyzeArgs) -> Result<Vec<RawPosition>> {
    if let Some(path) = &args.input {
        let body = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        return parse_positions_response(&body).wrap_err("failed to parse saved subgraph response");
    }

    let pool = args
        .pool
        .as_deref()
        .ok_or_else(|| eyre!("--pool is required unless --input is given"))?;

    let client = match args.subgraph_url.as_deref().or(ctx.subgraph_url.as_deref()) {
        Some(url) => SubgraphClient::new(url)?,
        None => {
            let api_key = ctx
                .api_key
                .as_deref()
                .ok_or_else(|| eyre!("THEGRAPH_API_KEY or PV_SUBGRAPH_URL is required for analyze"))?;
            SubgraphClient::from_api_key(api_key)?
        }
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message("fetching positions from subgraph");
    pb.enable_steady_tick(Duration::from_millis(100));

    let positions = client
        .fetch_positions(pool)
        .await
        .wrap_err("failed to fetch positions")?;

    pb.finish_and_clear();
    info!(pool, fetched = positions.len(), "positions fetched");
    Ok(positions)
}

struct AnalysisReport<'a> {
    enrichment: &'a EnrichmentResult,
    owners: &'a [(String, usize)],
    positions: &'a [EnrichedPosition],
    scores: &'a ScoreTable,
    reg_symbol: &'a str,
}

fn print_analysis_table(report: &AnalysisReport<'_>) {
    let other_symbol = report.enrichment.other_symbol.as_deref().unwrap_or("other");

    if let Some(price) = report.enrichment.current_price {
        println!("\n{}\n", current_price_line(price, other_symbol));
    }

    let mut owners = Table::new();
    owners.load_preset(UTF8_BORDERS_ONLY);
    owners.set_header(vec!["Owner", "Positions"]);
    for (owner, count) in report.owners.iter().take(TOP_OWNERS) {
        owners.add_row(vec![owner.clone(), count.to_string()]);
    }
    println!("{owners}");
    if report.owners.len() > TOP_OWNERS {
        println!("  ... and {} more owners", report.owners.len() - TOP_OWNERS);
    }
    println!();

    println!("Fixed-weight votes (4x {0}, 2x {0} equiv.)", report.reg_symbol);
    println!("{}\n", votes_table(report.positions));

    for column in &report.scores.columns {
        let summary = ModelSummary::summarize(report.positions, &column.scores);
        println!("{} Model", column.model_name);
        println!("  Equation:     {}", column.formula);
        println!("  Total Power:  {:.2}", summary.total_power);
        println!("  Active Power: {:.2}", summary.active_power);
        println!(
            "  Active:       {}/{} positions\n",
            summary.active_positions, summary.position_count
        );

        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec![
            "Position".to_string(),
            "Owner".to_string(),
            "Type".to_string(),
            report.reg_symbol.to_string(),
            other_symbol.to_string(),
            format!("{} equiv.", report.reg_symbol),
            "Range".to_string(),
            "Status".to_string(),
            "Power".to_string(),
        ]);

        for (position, score) in report.positions.iter().zip(&column.scores) {
            table.add_row(vec![
                position.id.clone(),
                position.owner.clone(),
                position.position_type_label(),
                format!("{:.4}", position.reg_amount),
                format!("{:.4}", position.other_amount),
                format!("{:.4}", position.reg_equivalent),
                format!("{:.6} - {:.6}", position.min_price, position.max_price),
                position.status_label().to_string(),
                format!("{score:.2}"),
            ]);
        }

        println!("{table}\n");
    }

    if !report.scores.diagnostics.is_empty() {
        println!(
            "{} formula error(s) scored as zero; rerun with -v for details\n",
            report.scores.diagnostics.len()
        );
    }

    let warnings = warning_lines(&report.enrichment.warnings);
    if !warnings.is_empty() {
        println!("Warnings:");
        for line in warnings {
            println!("  {line}");
        }
        println!();
    }
}

fn current_price_line(price: f64, other_symbol: &str) -> String {
    format!("Current price: {price:.6} {other_symbol}")
}

/// Enricher sub-scores per position, after the sanity clamp.
fn votes_table(positions: &[EnrichedPosition]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Position",
        "Owner",
        "Votes (REG)",
        "Votes (Equiv.)",
        "Votes (Total)",
    ]);
    for position in positions {
        table.add_row(vec![
            position.id.clone(),
            position.owner.clone(),
            format!("{:.2}", position.power_reg),
            format!("{:.2}", position.power_equivalent),
            format!("{:.2}", position.power_total),
        ]);
    }
    table
}

fn warning_lines(warnings: &[EnrichmentWarning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}

fn analysis_json(report: &AnalysisReport<'_>) -> Result<String> {
    #[derive(Serialize)]
    struct JsonOutput<'a> {
        current_price: Option<f64>,
        reg_symbol: &'a str,
        other_symbol: Option<&'a str>,
        owners: Vec<JsonOwner<'a>>,
        models: Vec<JsonModel<'a>>,
        positions: Vec<JsonPosition<'a>>,
        warnings: Vec<String>,
    }

    #[derive(Serialize)]
    struct JsonOwner<'a> {
        owner: &'a str,
        positions: usize,
    }

    #[derive(Serialize)]
    struct JsonModel<'a> {
        id: &'a str,
        name: &'a str,
        equation: &'a str,
        summary: ModelSummary,
        errors: Vec<String>,
    }

    #[derive(Serialize)]
    struct JsonPosition<'a> {
        id: &'a str,
        owner: &'a str,
        position_type: String,
        status: &'static str,
        reg_amount: f64,
        other_amount: f64,
        reg_equivalent: f64,
        min_price: f64,
        max_price: f64,
        relative_distance: f64,
        price_distance: f64,
        is_active: bool,
        power_reg: f64,
        power_equivalent: f64,
        power_total: f64,
        power: BTreeMap<&'a str, f64>,
    }

    let owners = report
        .owners
        .iter()
        .map(|(owner, positions)| JsonOwner {
            owner,
            positions: *positions,
        })
        .collect();

    let models = report
        .scores
        .columns
        .iter()
        .map(|column| JsonModel {
            id: &column.model_id,
            name: &column.model_name,
            equation: &column.formula,
            summary: ModelSummary::summarize(report.positions, &column.scores),
            errors: report
                .scores
                .diagnostics
                .iter()
                .filter(|diagnostic| diagnostic.model_id == column.model_id)
                .map(|diagnostic| match &diagnostic.position_id {
                    Some(position_id) => format!("position {position_id}: {}", diagnostic.error),
                    None => diagnostic.error.to_string(),
                })
                .collect(),
        })
        .collect();

    let positions = report
        .positions
        .iter()
        .enumerate()
        .map(|(i, position)| JsonPosition {
            id: &position.id,
            owner: &position.owner,
            position_type: position.position_type_label(),
            status: position.status_label(),
            reg_amount: position.reg_amount,
            other_amount: position.other_amount,
            reg_equivalent: position.reg_equivalent,
            min_price: position.min_price,
            max_price: position.max_price,
            relative_distance: position.relative_distance,
            price_distance: position.price_distance,
            is_active: position.is_active,
            power_reg: position.power_reg,
            power_equivalent: position.power_equivalent,
            power_total: position.power_total,
            power: report
                .scores
                .columns
                .iter()
                .map(|column| (column.model_id.as_str(), column.scores[i]))
                .collect(),
        })
        .collect();

    let output = JsonOutput {
        current_price: report.enrichment.current_price,
        reg_symbol: report.reg_symbol,
        other_symbol: report.enrichment.other_symbol.as_deref(),
        owners,
        models,
        positions,
        warnings: warning_lines(&report.enrichment.warnings),
    };

    serde_json::to_string_pretty(&output).wrap_err("failed to serialize JSON")
}

fn analysis_csv(report: &AnalysisReport<'_>) -> Vec<String> {
    let mut header = String::from(
        "position_id,owner,status,reg_amount,other_amount,reg_equivalent,min_price,max_price,\
         power_reg,power_equivalent,power_total",
    );
    for column in &report.scores.columns {
        header.push_str(",power_");
        header.push_str(&column.model_id);
    }

    let mut lines = vec![header];
    for (i, position) in report.positions.iter().enumerate() {
        let mut row = format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            position.id,
            position.owner,
            position.status_label(),
            position.reg_amount,
            position.other_amount,
            position.reg_equivalent,
            position.min_price,
            position.max_price,
            position.power_reg,
            position.power_equivalent,
            position.power_total,
        );
        for column in &report.scores.columns {
            row.push(',');
            row.push_str(&column.scores[i].to_string());
        }
        lines.push(row);
    }
    lines
}

async fn handle_models(args: ModelsArgs) -> Result<()> {
    let mut registry = load_registry(&args.file, true).await?;

    match args.action {
        ModelsAction::List => {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["ID", "Name", "Equation"]);
            for model in registry.models() {
                table.add_row(vec![
                    model.id.as_str(),
                    model.name.as_str(),
                    model.formula.source(),
                ]);
            }
            println!("\n{table}\n");
        }
        ModelsAction::Show { id } => {
            let model = registry
                .get(&id)
                .ok_or_else(|| eyre!("unknown model id '{id}'"))?;
            let status = match model.formula.compile_error() {
                Some(err) => format!("invalid: {err}"),
                None => "valid".to_string(),
            };

            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec!["ID", model.id.as_str()]);
            table.add_row(vec!["Name", model.name.as_str()]);
            table.add_row(vec!["Description", model.description.as_str()]);
            table.add_row(vec!["Equation", model.formula.source()]);
            table.add_row(vec!["Status", status.as_str()]);
            println!("\n{table}\n");
        }
        ModelsAction::Add {
            name,
            description,
            formula,
        } => {
            let draft = registry.draft();
            let id = registry.create(
                name.unwrap_or(draft.name),
                description.unwrap_or(draft.description),
                formula.unwrap_or(draft.formula),
            );
            save_registry(&args.file, &registry).await?;
            println!("Added model {id}");
        }
        ModelsAction::Update {
            id,
            name,
            description,
            formula,
        } => {
            let current = registry
                .get(&id)
                .ok_or_else(|| eyre!("unknown model id '{id}'"))?
                .clone();
            registry.update(
                &id,
                name.unwrap_or(current.name),
                description.unwrap_or(current.description),
                formula.unwrap_or_else(|| current.formula.source().to_string()),
            );
            save_registry(&args.file, &registry).await?;
            println!("Updated model {id}");
        }
        ModelsAction::Delete { id } => {
            if !registry.contains(&id) {
                return Err(eyre!("unknown model id '{id}'"));
            }
            if !registry.delete(&id) {
                return Err(eyre!("model '{id}' cannot be deleted"));
            }
            save_registry(&args.file, &registry).await?;
            println!("Deleted model {id}");
        }
        ModelsAction::Export { out } => {
            let json = registry.export()?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, json)
                        .await
                        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                    println!("Exported {} models to {}", registry.len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        ModelsAction::Import { from } => {
            let json = tokio::fs::read_to_string(&from)
                .await
                .wrap_err_with(|| format!("failed to read {}", from.display()))?;
            let report = registry
                .import(&json)
                .wrap_err_with(|| format!("failed to import {}", from.display()))?;
            save_registry(&args.file, &registry).await?;
            println!(
                "Successfully imported {} models ({} skipped)",
                report.imported, report.skipped
            );
        }
    }

    Ok(())
}

/// Read a models file. With `missing_ok`, an absent file yields a registry
/// holding only the default model.
async fn load_registry(path: &Path, missing_ok: bool) -> Result<ModelRegistry> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => ModelRegistry::restore(&json)
            .wrap_err_with(|| format!("invalid models file {}", path.display())),
        Err(err) if missing_ok && err.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "models file not found, starting from the default model");
            Ok(ModelRegistry::new())
        }
        Err(err) => Err(err).wrap_err_with(|| format!("failed to read {}", path.display())),
    }
}

async fn save_registry(path: &Path, registry: &ModelRegistry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .wrap_err_with(|| format!("failed to create directory {}", parent.display()))?;
    }
    tokio::fs::write(path, registry.export()?)
        .await
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), models = registry.len(), "models file saved");
    Ok(())
}

fn handle_curve(args: CurveArgs) -> Result<()> {
    if args.min > args.max {
        return Err(eyre!(
            "invalid range: min {} is greater than max {}",
            args.min,
            args.max
        ));
    }

    let formula = Formula::new(args.formula.as_str());
    if let Some(err) = formula.compile_error() {
        return Err(eyre!("formula does not compile: {err}"));
    }

    let points = multiplier_curve(&formula, args.min, args.max, args.current, args.samples);

    match args.output.to_lowercase().as_str() {
        "table" => print_curve_table(&points, args.current),
        "json" => {
            let json_str =
                serde_json::to_string_pretty(&points).wrap_err("failed to serialize JSON")?;
            println!("{json_str}");
        }
        "csv" => {
            println!("price,multiplier");
            for point in &points {
                println!("{},{}", point.price, point.multiplier);
            }
        }
        _ => {
            return Err(eyre!(
                "unknown output format '{}'; use 'table', 'json', or 'csv'",
                args.output
            ))
        }
    }

    Ok(())
}

fn print_curve_table(points: &[CurvePoint], current: f64) {
    // Marks the sample closest to the current price.
    let nearest = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (a.price - current)
                .abs()
                .total_cmp(&(b.price - current).abs())
        })
        .map(|(i, _)| i);

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Center Price", "Multiplier", ""]);
    for (i, point) in points.iter().enumerate() {
        let marker = if Some(i) == nearest { "<- current" } else { "" };
        table.add_row(vec![
            format!("{:.6}", point.price),
            format!("{:.4}", point.multiplier),
            marker.to_string(),
        ]);
    }
    println!("\n{table}\n");
}

fn handle_eval(args: EvalArgs) -> Result<()> {
    let mut vars = Variables::new();
    for (name, value) in args.vars {
        vars.insert(name, value);
    }

    let formula = Formula::new(args.formula.as_str());
    let score = formula
        .try_evaluate(args.reg_amount, args.reg_equivalent, &vars)
        .wrap_err("formula evaluation failed")?;
    println!("{score}");
    Ok(())
}

fn parse_var(raw: &str) -> std::result::Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }

    let value = match value.trim() {
        "true" => Value::Flag(true),
        "false" => Value::Flag(false),
        number => Value::Number(
            number
                .parse::<f64>()
                .map_err(|err| format!("invalid value for {name}: {err}"))?,
        ),
    };
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pv_analysis::enrich::CAPPED_AMOUNT;
    use pv_data::types::{RawPool, RawPosition, RawTick, RawToken};

    fn token(symbol: &str) -> RawToken {
        RawToken {
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }

    fn tick(idx: i32) -> RawTick {
        let price0 = 1.0001f64.powi(idx);
        RawTick {
            tick_idx: idx,
            price0,
            price1: 1.0 / price0,
        }
    }

    /// REG/USDC position around tick 0 with the pool quoting `token1_price`.
    fn position(id: &str, token1_price: f64) -> RawPosition {
        RawPosition {
            id: id.to_string(),
            owner: "0xabc".to_string(),
            liquidity: 1_000_000_000_000_000_000_000,
            tick_lower: tick(-600),
            tick_upper: tick(600),
            token0: token("REG"),
            token1: token("USDC"),
            pool: RawPool {
                tick: 0,
                liquidity: 1_000_000_000_000_000_000_000,
                token0_price: 1.0,
                token1_price,
                token0: token("REG"),
                token1: token("USDC"),
            },
        }
    }

    fn with_report<T>(f: impl FnOnce(&AnalysisReport<'_>) -> T) -> T {
        let enrichment = PositionEnricher::default().enrich(&[position("1", 1.0), position("tiny", 1e-18)]);
        let owners = owner_position_counts(&enrichment.positions);
        let scores = score_positions(&ModelRegistry::new(), &enrichment.positions);
        let report = AnalysisReport {
            enrichment: &enrichment,
            owners: &owners,
            positions: &enrichment.positions,
            scores: &scores,
            reg_symbol: DEFAULT_REG_SYMBOL,
        };
        f(&report)
    }

    #[test]
    fn json_carries_clamped_sub_scores_and_warnings() {
        let json = with_report(analysis_json).expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        let tiny = &value["positions"][1];
        assert_eq!(tiny["id"], "tiny");
        assert_eq!(tiny["power_equivalent"].as_f64(), Some(CAPPED_AMOUNT * 2.0));
        let total = tiny["power_total"].as_f64().expect("number");
        let parts = tiny["power_reg"].as_f64().expect("number") + CAPPED_AMOUNT * 2.0;
        assert!((total - parts).abs() < 1e-9);

        let warnings = value["warnings"].as_array().expect("array");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().is_some_and(|w| w.contains("tiny")));
    }

    #[test]
    fn csv_has_sub_score_columns() {
        let lines = with_report(analysis_csv);
        let header: Vec<&str> = lines[0].split(',').collect();
        let col = |name: &str| header.iter().position(|h| *h == name).expect(name);
        let tiny: Vec<&str> = lines[2].split(',').collect();

        assert_eq!(header.len(), tiny.len());
        assert_eq!(tiny[0], "tiny");
        assert_eq!(tiny[col("power_equivalent")], (CAPPED_AMOUNT * 2.0).to_string());
        assert!(header.contains(&"power_default"));
    }

    #[test]
    fn table_shows_votes_and_warnings() {
        let (votes, warnings) = with_report(|report| {
            (
                votes_table(report.positions).to_string(),
                warning_lines(&report.enrichment.warnings),
            )
        });
        assert!(votes.contains("Votes (Equiv.)"));
        assert!(votes.contains("200000.00"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn current_price_names_the_quote_token() {
        assert_eq!(current_price_line(1.5, "USDC"), "Current price: 1.500000 USDC");
    }

    #[test]
    fn parse_var_accepts_numbers_and_flags() {
        assert_eq!(parse_var("x=2.5"), Ok(("x".to_string(), Value::Number(2.5))));
        assert_eq!(parse_var("on = true"), Ok(("on".to_string(), Value::Flag(true))));
        assert!(parse_var("=1").is_err());
        assert!(parse_var("x").is_err());
    }
}
