//! Purpose: `db721` CLI entry point: inspect metadata, scan rows, and verify files.
//! Role: Binary crate root; parses args, initializes logging, emits results on stdout.
//! Invariants: `scan` emits one row per line (JSON array or TSV); other commands emit one document.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{
    ArgAction, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod schema_json;

use db721::api::{
    CursorResult, DEFAULT_MAX_TOKENS, Error, ErrorKind, FileDescriptor, ParseOptions, Row,
    ScanHandle, ScanOptions, open_scan_with, read_descriptor_with, to_exit_code,
};
use schema_json::{column_stats_json, descriptor_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;
    let parse = ParseOptions::new().with_max_tokens(cli.max_tokens);

    let result = command_dispatch::dispatch_command(cli.command, parse, color_mode);

    result
        .map_err(add_parse_hint)
        .map_err(add_truncated_hint)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "db721",
    version,
    about = "Inspect and scan db721 columnar files",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A db721 file holds fixed-width column data followed by a JSON metadata footer.

Mental model:
  - `schema` reads the footer (table, columns, row count)
  - `scan` decodes rows, optionally projecting columns
  - `check` decodes every row and reports the first problem
"#,
    after_help = r#"EXAMPLES
  $ db721 schema data-farms.db721
  $ db721 scan data-farms.db721 --columns farm_name,min_age_weeks --limit 5
  $ db721 stats data-chickens.db721 --column weight_g
  $ db721 check data-chickens.db721

LEARN MORE
  $ db721 <command> --help
  Set RUST_LOG=db721=debug (or pass -v) to trace metadata resolution."#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        global = true,
        help = "Colorize stderr diagnostics and human output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_TOKENS,
        value_parser = parse_max_tokens,
        global = true,
        help = "Maximum metadata tokens before parsing fails"
    )]
    max_tokens: usize,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Log library activity to stderr (-v debug, -vv trace)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScanFormat {
    Jsonl,
    Tsv,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Show table name, row count, and columns",
        long_about = r#"Resolve the metadata footer and print the table layout.

Columns are listed in metadata order, which is also the order `scan` emits values in."#,
        after_help = r#"EXAMPLES
  $ db721 schema data-farms.db721
  $ db721 schema data-farms.db721 --json"#
    )]
    Schema {
        #[arg(help = "Path to a db721 file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, help = "Emit JSON instead of human-readable output")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Decode rows",
        long_about = r#"Decode rows in order and print one row per line.

jsonl prints each row as a JSON array; tsv prints a header line, then tab-separated values."#,
        after_help = r#"EXAMPLES
  $ db721 scan data-farms.db721
  $ db721 scan data-farms.db721 --columns farm_name --limit 10
  $ db721 scan data-chickens.db721 --format tsv

NOTES
  - Projected columns keep metadata order, whatever order they are listed in."#
    )]
    Scan {
        #[arg(help = "Path to a db721 file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma-separated column names to decode (default: all)"
        )]
        columns: Option<Vec<String>>,
        #[arg(long, help = "Stop after this many rows")]
        limit: Option<u64>,
        #[arg(long, value_enum, default_value = "jsonl", help = "Row format: jsonl|tsv")]
        format: ScanFormat,
    },
    #[command(
        arg_required_else_help = true,
        about = "Print per-block statistics as JSON",
        after_help = r#"EXAMPLES
  $ db721 stats data-chickens.db721
  $ db721 stats data-chickens.db721 --column weight_g"#
    )]
    Stats {
        #[arg(help = "Path to a db721 file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, help = "Only report this column")]
        column: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Verify that every row decodes",
        long_about = r#"Resolve metadata, load every column, and decode every row.

Reports OK with the row count, or the first error with its exit code."#,
        after_help = r#"EXAMPLES
  $ db721 check data-farms.db721
  $ db721 check data-farms.db721 --json"#
    )]
    Check {
        #[arg(help = "Path to a db721 file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, help = "Emit JSON instead of human-readable output")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ db721 completion bash > ~/.local/share/bash-completion/completions/db721
  $ db721 completion zsh > ~/.zfunc/_db721
  $ db721 completion fish > ~/.config/fish/completions/db721.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn parse_max_tokens(input: &str) -> Result<usize, String> {
    let value = input
        .parse::<usize>()
        .map_err(|_| format!("`{input}` is not a whole number"))?;
    if value == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(value)
}

fn init_tracing(verbose: u8) {
    let env_filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_parse_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Parse => {
            err.with_hint("The metadata footer is malformed. Confirm the file is a db721 file.")
        }
        ErrorKind::MissingField => {
            err.with_hint("The metadata footer lacks a required key; the writer may be incompatible.")
        }
        ErrorKind::UnsupportedType => {
            err.with_hint("Supported column types are str, int, and float.")
        }
        _ => err,
    }
}

fn add_truncated_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::TruncatedRead || err.hint().is_some() {
        return err;
    }
    err.with_hint("The file is shorter than its metadata claims. It may be truncated or still being written.")
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Corrupt => {
            err.with_hint("Column data does not decode. Run `db721 check` to find the first bad row.")
        }
        ErrorKind::SchemaConsistency => {
            err.with_hint("Metadata contradicts itself; the file was likely written incorrectly.")
        }
        _ => err,
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("I/O error. Check that the path exists and is readable.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_schema_human(path: &Path, descriptor: &FileDescriptor, use_color: bool) {
    let label = |text: &str| colorize_label(text, use_color, AnsiColor::Yellow);
    println!("{} {}", label("table:"), descriptor.table_name);
    println!("{} {}", label("path:"), path.display());
    println!("{} {}", label("rows:"), descriptor.num_rows());
    println!(
        "{} {}",
        label("max values per block:"),
        descriptor.max_values_per_block
    );
    if descriptor.columns.is_empty() {
        println!("{} none", label("columns:"));
        return;
    }
    let rows = descriptor
        .columns
        .iter()
        .map(|column| {
            vec![
                column.name.clone(),
                column.data_type.tag().to_string(),
                column.start_offset.to_string(),
                column.num_blocks.to_string(),
                column.num_records().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    println!();
    emit_table(&["NAME", "TYPE", "OFFSET", "BLOCKS", "RECORDS"], &rows);
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    let sanitized_rows = rows
        .iter()
        .map(|row| {
            widths
                .iter_mut()
                .enumerate()
                .map(|(idx, width)| {
                    let cleaned = sanitize_cell(row.get(idx).map(String::as_str).unwrap_or(""));
                    *width = (*width).max(cleaned.chars().count());
                    cleaned
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    let header_cells = headers
        .iter()
        .map(|header| header.to_string())
        .collect::<Vec<_>>();
    lines.push(format_table_line(&header_cells, &widths));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

/// Escapes characters that would break a line- or tab-oriented layout.
fn sanitize_cell(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if idx + 1 < widths.len() && *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line
}

/// Streams rows to `out`. Returns the number of rows written; a closed pipe ends the scan early.
fn write_scan<W: Write>(
    handle: &mut ScanHandle,
    out: &mut W,
    format: ScanFormat,
    limit: Option<u64>,
) -> Result<u64, Error> {
    if format == ScanFormat::Tsv {
        let header = handle
            .schema()
            .iter()
            .map(|(name, _)| sanitize_cell(name))
            .collect::<Vec<_>>()
            .join("\t");
        if !write_output(out, format!("{header}\n").as_bytes())? {
            return Ok(0);
        }
    }

    let mut written = 0u64;
    while limit.is_none_or(|limit| written < limit) {
        let row = match handle.next()? {
            CursorResult::Row(row) => row,
            CursorResult::EndOfScan => break,
        };
        let line = match format {
            ScanFormat::Jsonl => row_json_line(&row)?,
            ScanFormat::Tsv => row_tsv_line(&row),
        };
        if !write_output(out, line.as_bytes())? {
            return Ok(written);
        }
        written += 1;
    }
    match out.flush() {
        Ok(()) => Ok(written),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(written),
        Err(err) => Err(output_error(err)),
    }
}

fn row_json_line(row: &Row) -> Result<String, Error> {
    let mut line = serde_json::to_string(row).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode row")
            .with_source(err)
    })?;
    line.push('\n');
    Ok(line)
}

fn row_tsv_line(row: &Row) -> String {
    let mut line = row
        .values
        .iter()
        .map(|value| sanitize_cell(&value.to_string()))
        .collect::<Vec<_>>()
        .join("\t");
    line.push('\n');
    line
}

/// `Ok(false)` when the reader went away.
fn write_output<W: Write>(out: &mut W, bytes: &[u8]) -> Result<bool, Error> {
    match out.write_all(bytes) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(err) => Err(output_error(err)),
    }
}

fn output_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
    Green,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
        AnsiColor::Green => "32",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::Io => "i/o error",
        ErrorKind::TruncatedRead => "file is truncated",
        ErrorKind::Parse => "metadata parse error",
        ErrorKind::MissingField => "missing metadata field",
        ErrorKind::UnsupportedType => "unsupported column type",
        ErrorKind::SchemaConsistency => "inconsistent metadata",
        ErrorKind::Corrupt => "corrupt column data",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(row) = err.row() {
        inner.insert("row".to_string(), json!(row));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    if let Some(expected_len) = err.expected_len() {
        inner.insert("expected_len".to_string(), json!(expected_len));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let label = |text: &str| colorize_label(text, use_color, AnsiColor::Yellow);
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint:")));
    }
    if let Some(path) = err.path() {
        lines.push(format!("{} {}", label("path:"), path.display()));
    }
    if let Some(field) = err.field() {
        lines.push(format!("{} {field}", label("field:")));
    }
    if let Some(column) = err.column() {
        lines.push(format!("{} {column}", label("column:")));
    }
    if let Some(row) = err.row() {
        lines.push(format!("{} {row}", label("row:")));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("{} {offset}", label("offset:")));
    }
    if let Some(expected_len) = err.expected_len() {
        lines.push(format!("{} {expected_len}", label("expected length:")));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!("{} {cause}", label("caused by:")));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `db721 --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "db721") else {
        return "Try `db721 --help`.".to_string();
    };
    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return "Try `db721 --help`.".to_string();
    }
    format!("Try `db721 {} --help`.", parts.join(" "))
}
