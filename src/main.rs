use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use relplan::config::PlannerConfig;
use relplan::context_graph::{Context, ROOT};
use relplan::mapping_catalog::MappingConfig;
use relplan::query_planner::{ExecutionStrategy, QueryPlanner, QueryRequest};
use relplan::sql_generator::{AnsiSqlWriter, LimitStyle, StatementWriter};

/// relplan - plan a mapped query and print the SQL it runs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mapping definition (YAML)
    #[arg(long)]
    mapping: PathBuf,

    /// Query request (JSON)
    #[arg(long)]
    request: PathBuf,

    /// Entity the query targets
    #[arg(long)]
    entity: String,

    /// Planner configuration (YAML); RELPLAN_* variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pagination syntax of the rendered SQL
    #[arg(long, value_enum, default_value_t = LimitArg::LimitOffset)]
    limit_style: LimitArg,

    /// Print the plan as JSON instead of SQL
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LimitArg {
    LimitOffset,
    OffsetFetch,
}

impl From<LimitArg> for LimitStyle {
    fn from(arg: LimitArg) -> Self {
        match arg {
            LimitArg::LimitOffset => LimitStyle::LimitOffset,
            LimitArg::OffsetFetch => LimitStyle::OffsetFetch,
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PlannerConfig::from_yaml_file(path),
        None => PlannerConfig::from_env(),
    }
    .context("invalid planner configuration")?;
    log::debug!("planner config: {:?}", config);

    let catalog = MappingConfig::from_yaml_file(&cli.mapping)
        .and_then(MappingConfig::into_catalog)
        .with_context(|| format!("loading mapping {}", cli.mapping.display()))?;
    let request: QueryRequest = serde_json::from_str(
        &std::fs::read_to_string(&cli.request)
            .with_context(|| format!("reading request {}", cli.request.display()))?,
    )
    .context("parsing query request")?;

    let mut context = Context::new(Arc::new(catalog), &cli.entity)?;
    let mut planner = QueryPlanner::new(&mut context);
    let strategy = planner.plan_execution(ROOT, &request)?;
    let includes = planner.plan_includes(strategy.result_plan(), request.includes())?;

    if cli.json {
        let plans: Vec<_> = includes.iter().map(|i| (&i.path, &i.plan)).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "strategy": strategy,
                "includes": plans,
            }))?
        );
        return Ok(());
    }

    let writer = AnsiSqlWriter::new(cli.limit_style.into());
    print!("{}", strategy);
    match &strategy {
        ExecutionStrategy::Direct(plan) => {
            println!("\n{}", writer.write_query(plan)?);
        }
        ExecutionStrategy::TwoPhase { keys, rows } => {
            println!("\n-- phase 1\n{}", writer.write_query(keys)?);
            println!("-- phase 2 (keys bound from phase 1)\n{}", writer.write_query(rows)?);
        }
    }
    for include in &includes {
        println!(
            "\n-- include `{}` (by {} of `{}`)\n{}",
            include.path,
            include.parent_key_alias,
            if include.parent.is_empty() { "<root>" } else { include.parent.as_str() },
            writer.write_query(&include.plan)?
        );
    }
    Ok(())
}
