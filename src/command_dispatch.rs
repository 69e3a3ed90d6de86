//! Purpose: Hold top-level CLI command dispatch for `dgread`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Warnings are emitted as notices before the command's stdout payload.
//! Invariants: Helpers in `main.rs` remain the source of output formatting.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    options: ReadOptions,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "dgread", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(
                &json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }),
                true,
            )?;
            Ok(RunOutcome::ok())
        }
        Command::Read { path, compact } => {
            let reader = Reader::new(options);
            let outcome = reader.read(&path)?;
            emit_warnings("read", &outcome.warnings, color_mode);
            emit_json(&outcome.record, compact)?;
            Ok(RunOutcome::ok())
        }
        Command::Info { path, compact } => {
            let reader = Reader::new(options);
            let loaded = reader.load(&path)?;
            emit_warnings("info", &loaded.warnings, color_mode);
            emit_json(
                &json!({
                    "filename": loaded.filename,
                    "columns": group_summary(&loaded.group),
                }),
                compact,
            )?;
            Ok(RunOutcome::ok())
        }
    }
}
