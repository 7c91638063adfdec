//! Purpose: Hold top-level CLI command dispatch for `db721`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command resolves metadata with the caller's `ParseOptions`.
//! Invariants: Scans are closed on every exit path, including errors.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    parse: ParseOptions,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "db721", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Schema { file, json } => {
            let descriptor = read_descriptor_with(&file, &parse)?;
            if json {
                emit_json(descriptor_json(&file, &descriptor));
            } else {
                let use_color = color_mode.use_color(io::stdout().is_terminal());
                emit_schema_human(&file, &descriptor, use_color);
            }
            Ok(RunOutcome::ok())
        }
        Command::Scan {
            file,
            columns,
            limit,
            format,
        } => {
            let mut options = ScanOptions::new().with_parse(parse);
            if let Some(columns) = columns {
                options = options.with_columns(columns);
            }
            let mut handle = open_scan_with(&file, &options)?;
            let stdout = io::stdout();
            let mut out = io::BufWriter::new(stdout.lock());
            let result = write_scan(&mut handle, &mut out, format, limit);
            handle.close();
            let written = result?;
            tracing::debug!(path = %file.display(), rows = written, "scan written");
            Ok(RunOutcome::ok())
        }
        Command::Stats { file, column } => {
            let descriptor = read_descriptor_with(&file, &parse)?;
            let columns = match column.as_deref() {
                Some(name) => {
                    let column = descriptor.column(name).ok_or_else(|| {
                        Error::new(ErrorKind::Usage)
                            .with_message(format!("unknown column {name:?}"))
                            .with_column(name)
                            .with_path(&file)
                            .with_hint("Run `db721 schema` to list column names.")
                    })?;
                    vec![column_stats_json(column)?]
                }
                None => descriptor
                    .columns
                    .iter()
                    .map(column_stats_json)
                    .collect::<Result<Vec<_>, _>>()?,
            };
            emit_json(json!({
                "table": descriptor.table_name,
                "max_values_per_block": descriptor.max_values_per_block,
                "columns": columns,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Check { file, json } => {
            let mut handle = open_scan_with(&file, &ScanOptions::new().with_parse(parse))?;
            let result = count_rows(&mut handle);
            handle.close();
            let rows = result?;
            let table = handle.descriptor().table_name.as_str();
            let num_columns = handle.descriptor().columns.len();
            if json {
                emit_json(json!({
                    "ok": true,
                    "path": file.display().to_string(),
                    "table": table,
                    "num_rows": rows,
                    "num_columns": num_columns,
                }));
            } else {
                let use_color = color_mode.use_color(io::stdout().is_terminal());
                println!(
                    "{} {} ({table}, {rows} rows, {num_columns} columns)",
                    colorize_label("ok:", use_color, AnsiColor::Green),
                    file.display(),
                );
            }
            Ok(RunOutcome::ok())
        }
    }
}

fn count_rows(handle: &mut ScanHandle) -> Result<u64, Error> {
    let mut rows = 0u64;
    while let CursorResult::Row(_) = handle.next()? {
        rows += 1;
    }
    Ok(rows)
}
