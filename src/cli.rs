use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Edit cohort membership records", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// SQLite database holding the table
    #[arg(long = "database", env = "SQL_CONNECTION_STRING", global = true)]
    pub database: Option<String>,
    /// YAML table configuration (defaults to the built-in cohort member table)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the configured columns and how each is edited
    Schema(SchemaArgs),
    /// Show up to the row limit of records, optionally filtered
    List(ListArgs),
    /// Export records to CSV for editing
    Export(ExportArgs),
    /// Save an edited CSV back to the database
    Save(SaveArgs),
    /// Add a new record
    Add(AddArgs),
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Also write the effective configuration as YAML to this path
    #[arg(long)]
    pub emit: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Partial-match filters of the form `Column=term`
    #[arg(short = 'f', long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Print rows as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Edited CSV file produced by `export`
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the edited file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Field values of the form `Column=value`
    #[arg(short = 's', long = "set", action = clap::ArgAction::Append)]
    pub values: Vec<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
