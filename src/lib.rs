//! Query templating and schemaless result mapping for graph database
//! clients.
//!
//! A [`template::PlaceholderTemplate`] turns query text with `#name`
//! placeholders into executable text; a [`rows::ResultMapper`] compiles a
//! table filler such as `add(row)` and a row filler such as
//! `put(colName, colValue)` or `setter(colValue)` against explicit
//! [`class::ClassDef`] descriptors and maps result records onto them.

pub mod builtin;
pub mod class;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod data;
pub mod error;
pub mod fill;
pub mod metadata;
pub mod record;
pub mod relation;
pub mod rows;
pub mod statement;
pub mod table;
pub mod template;

use std::{collections::BTreeMap, env, fs, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    builtin::RowList,
    cli::{Cli, Commands, OutputFormat, TemplateSource},
    config::StatementConfig,
    statement::{LogQueryLog, ReplayDriver},
    template::{PlaceholderTemplate, TemplateOptions},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cqlmap", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => handle_render(&args),
        Commands::Map(args) => handle_map(&args),
        Commands::Inspect(args) => handle_inspect(&args),
    }
}

fn load_template(source: &TemplateSource) -> Result<PlaceholderTemplate> {
    match (&source.statement, &source.template) {
        (Some(path), _) => {
            let mut config = StatementConfig::load(path)?;
            if source.marker.is_some() {
                config.marker = source.marker;
            }
            config
                .parse_template()
                .with_context(|| format!("Parsing template from {path:?}"))
        }
        (None, Some(text)) => {
            let options = source
                .marker
                .map(|marker| TemplateOptions { marker })
                .unwrap_or_default();
            PlaceholderTemplate::parse_with(text, options).context("Parsing inline template")
        }
        (None, None) => Err(anyhow!("Either --statement or --template is required")),
    }
}

fn handle_render(args: &cli::RenderArgs) -> Result<()> {
    let template = load_template(&args.source)?;
    let values = match &args.values {
        Some(path) => config::load_values(path)?,
        None => BTreeMap::new(),
    };
    debug!("Rendering with {} value(s)", values.len());
    let rendered = template
        .substitute(&values)
        .context("Rendering template")?;
    println!("{rendered}");
    Ok(())
}

fn handle_map(args: &cli::MapArgs) -> Result<()> {
    info!("Mapping records from '{}'", args.input.display());
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("Opening records file {:?}", args.input))?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing records file {:?}", args.input))?;
    let records = record::records_from_json(&json)
        .with_context(|| format!("Records in {:?} must be an array of objects", args.input))?;
    let config = match &args.statement {
        Some(path) => StatementConfig::load(path)?,
        None => StatementConfig::default(),
    };

    let result = match &args.values {
        Some(values_path) => {
            let mut statement = config
                .builtin_statement()?
                .with_log(Arc::new(LogQueryLog));
            if let Some(style) = args.name_style {
                statement.mapper_mut().set_name_style(style);
            }
            let values = config::load_values(values_path)?;
            let driver = ReplayDriver::new(records);
            statement.query_window(&driver, &values, args.start_row, args.window)?
        }
        None => {
            let mut mapper = builtin::builtin_mapper();
            config.configure(&mut mapper);
            if let Some(style) = args.name_style {
                mapper.set_name_style(style);
            }
            mapper.materialize(records, args.start_row, args.window)?
        }
    };

    if let Some(meta) = &args.meta {
        result
            .metadata
            .save(meta)
            .with_context(|| format!("Writing metadata to {meta:?}"))?;
        info!(
            "Metadata for {} column(s) written to {:?}",
            result.column_count, meta
        );
    }
    let rows = result
        .into_table::<RowList>()
        .ok_or_else(|| anyhow!("Mapped table is not a row list"))?;
    match args.format {
        OutputFormat::Table => table::print_rows(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}

fn handle_inspect(args: &cli::InspectArgs) -> Result<()> {
    let template = load_template(&args.source)?;
    let tokens = if args.by_length {
        template.tokens_by_length()
    } else {
        template.tokens()
    };
    for token in tokens {
        println!("{token}");
    }
    info!(
        "{} placeholder(s), {} optional segment(s)",
        tokens.len(),
        template.optional_segment_count()
    );
    Ok(())
}
