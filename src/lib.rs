pub mod cli;
pub mod editor;
pub mod error;
pub mod field;
pub mod io_utils;
pub mod query;
pub mod reconcile;
pub mod repository;
pub mod schema;
pub mod snapshot;
pub mod table;
pub mod value;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, ConnectionArgs},
    editor::Editor,
    query::SearchFilters,
    reconcile::EditedRow,
    repository::SqliteRepository,
    schema::TableConfig,
};

pub use crate::error::EditorError;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cohort_editor", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli.connection)?;
    match cli.command {
        Commands::Schema(args) => handle_schema(&config, &args),
        Commands::List(args) => handle_list(open_editor(&cli.connection, config)?, &args),
        Commands::Export(args) => handle_export(open_editor(&cli.connection, config)?, &args),
        Commands::Save(args) => handle_save(open_editor(&cli.connection, config)?, &args),
        Commands::Add(args) => handle_add(open_editor(&cli.connection, config)?, &args),
    }
}

fn load_config(args: &ConnectionArgs) -> Result<TableConfig> {
    match &args.config {
        Some(path) => {
            TableConfig::load(path).with_context(|| format!("Loading table config from {path:?}"))
        }
        None => Ok(TableConfig::cohort_member()),
    }
}

fn open_editor(args: &ConnectionArgs, config: TableConfig) -> Result<Editor<SqliteRepository>> {
    let connection = args
        .database
        .as_deref()
        .ok_or_else(|| anyhow!("No database given; pass --database or set SQL_CONNECTION_STRING"))?;
    let repository = SqliteRepository::new(connection)?;
    debug!("Using database {:?}", repository.path());
    Ok(Editor::new(config, repository))
}

fn handle_schema(config: &TableConfig, args: &cli::SchemaArgs) -> Result<()> {
    let rows = config
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let mut notes = Vec::new();
            if column.name == config.primary_key {
                notes.push("primary key");
            }
            if config.is_ignored(&column.name) {
                notes.push("server managed");
            }
            if config.is_searchable(&column.name) {
                notes.push("searchable");
            }
            if config.required_fields.contains(&column.name) {
                notes.push("required");
            } else if config.create_fields.contains(&column.name) {
                notes.push("on create");
            }
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.kind.to_string(),
                notes.join(", "),
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["#", "name", "kind", "notes"].map(String::from);
    table::print_table(&headers, &rows);

    if let Some(path) = &args.emit {
        config
            .save(path)
            .with_context(|| format!("Writing table config to {path:?}"))?;
        info!("Table config written to {path:?}");
    }
    Ok(())
}

fn search(editor: &mut Editor<SqliteRepository>, filters: &cli::FilterArgs) -> Result<()> {
    let filters = SearchFilters::parse(&filters.filters)?;
    let table = editor.config().table.clone();
    editor
        .search(filters)
        .map(|_| ())
        .with_context(|| format!("Loading records from {table}"))?;
    if editor.is_possibly_truncated() {
        warn!(
            "Showing the first {} row(s) only; narrow the search to see the rest",
            editor.config().row_limit
        );
    }
    Ok(())
}

fn handle_list(mut editor: Editor<SqliteRepository>, args: &cli::ListArgs) -> Result<()> {
    search(&mut editor, &args.filter)?;
    let snapshot = editor
        .store()
        .snapshot()
        .ok_or_else(|| anyhow!("No records loaded"))?;
    if args.json {
        let body = serde_json::json!({
            "headers": snapshot.headers(),
            "rows": snapshot.canonical_rows(),
            "possibly_truncated": editor.is_possibly_truncated(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        table::print_table(snapshot.headers(), &snapshot.canonical_rows());
    }
    Ok(())
}

fn handle_export(mut editor: Editor<SqliteRepository>, args: &cli::ExportArgs) -> Result<()> {
    search(&mut editor, &args.filter)?;
    let snapshot = editor
        .store()
        .snapshot()
        .ok_or_else(|| anyhow!("No records loaded"))?;
    let delimiter = match &args.output {
        Some(path) => io_utils::resolve_delimiter(path, args.delimiter),
        None => args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
    };
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), delimiter)?;
    let written = io_utils::write_snapshot(&mut writer, snapshot)?;
    info!(
        "Exported {written} row(s) to {}",
        args.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into())
    );
    Ok(())
}

fn handle_save(mut editor: Editor<SqliteRepository>, args: &cli::SaveArgs) -> Result<()> {
    let delimiter = io_utils::resolve_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let (headers, rows) = io_utils::read_edited_rows(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading edited rows from {:?}", args.input))?;

    search(&mut editor, &args.filter)?;
    let expected = editor.store().headers();
    if headers != expected {
        bail!(
            "Columns in {:?} do not match {} ({}); export again before editing",
            args.input,
            editor.config().table,
            expected.join(", ")
        );
    }
    if rows.len() != editor.store().len() {
        warn!(
            "{:?} has {} row(s) but {} were loaded; only matching positions are compared",
            args.input,
            rows.len(),
            editor.store().len()
        );
    }

    let report = editor
        .save(&rows)
        .with_context(|| format!("Saving edited rows from {:?}", args.input))?;
    println!("{report}");
    if report.has_errors() {
        bail!("{} row(s) failed to save", report.per_row_errors.len());
    }
    if report.reload_error.is_some() {
        bail!("Saved changes could not be reloaded; run `list` to check the table");
    }
    Ok(())
}

fn handle_add(mut editor: Editor<SqliteRepository>, args: &cli::AddArgs) -> Result<()> {
    let values = parse_assignments(&args.values)?;
    let inserted = editor
        .add_record(&values)
        .with_context(|| format!("Adding record to {}", editor.config().table))?;
    println!("Successfully added {inserted} record(s).");
    Ok(())
}

fn parse_assignments(values: &[String]) -> Result<EditedRow> {
    values
        .iter()
        .map(|assignment| {
            let (column, value) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow!("Value '{assignment}' must be of the form Column=value"))?;
            Ok((column.trim().to_string(), value.to_string()))
        })
        .collect()
}
