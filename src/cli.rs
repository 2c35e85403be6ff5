use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::metadata::NameStyle;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render graph query templates and map query results onto rows",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Substitute placeholder values into a query template
    Render(RenderArgs),
    /// Map a JSON file of result records into rows and print them
    Map(MapArgs),
    /// List the placeholders a template declares
    Inspect(InspectArgs),
}

/// Where the query template comes from.
#[derive(Debug, Args)]
pub struct TemplateSource {
    /// Statement definition (YAML) holding the template and mapping options
    #[arg(short, long, conflicts_with = "template")]
    pub statement: Option<PathBuf>,
    /// Inline template text
    #[arg(short, long)]
    pub template: Option<String>,
    /// Placeholder marker character (defaults to '#')
    #[arg(long)]
    pub marker: Option<char>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: TemplateSource,
    /// YAML or JSON mapping of placeholder names to values
    #[arg(short, long)]
    pub values: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// JSON array of result records
    #[arg(short, long)]
    pub input: PathBuf,
    /// Statement definition supplying fillers, name style and relation keys
    #[arg(short, long)]
    pub statement: Option<PathBuf>,
    /// Placeholder values; renders and logs the statement's query before mapping
    #[arg(short, long, requires = "statement")]
    pub values: Option<PathBuf>,
    /// First record ordinal to map (only with --window)
    #[arg(long, default_value_t = 0)]
    pub start_row: usize,
    /// Number of records to map from --start-row (0 maps everything)
    #[arg(long, default_value_t = 0)]
    pub window: usize,
    /// Overrides the statement's field name style
    #[arg(long, value_enum)]
    pub name_style: Option<NameStyle>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Write the observed column metadata to this JSON file
    #[arg(long)]
    pub meta: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: TemplateSource,
    /// List placeholders longest first instead of in order of appearance
    #[arg(long)]
    pub by_length: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
