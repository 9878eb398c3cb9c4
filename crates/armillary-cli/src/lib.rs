//! CLI logic for the Armillary model tool.
//!
//! Loads a document (repairing it on the way in), replays recorded
//! operations, steps back through history, prints query results and writes
//! the document back out.

pub mod error_adapter;

mod args;
mod config;

pub use args::Args;

use std::{fs, io::Write};

use log::{info, warn};

use armillary::{
    ArmillaryError, Repository,
    codec::CodecError,
    operation::Operation,
};

/// Run the Armillary CLI application
///
/// Query results are written to `out`, one `id type name` line per element.
///
/// # Errors
///
/// Returns `ArmillaryError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Malformed documents or operation files
/// - Operations that cannot be applied or undone
/// - Malformed selectors
pub fn run(args: &Args, out: &mut impl Write) -> Result<(), ArmillaryError> {
    info!(input_path = args.input; "Processing document");

    let app_config = config::load_config(args.config.as_ref())?;

    let source = fs::read_to_string(&args.input)?;
    let mut repo = Repository::with_standard_schema(app_config.repository().clone())?;
    let report = repo.load_str(&source)?;
    for fix in report.fixes() {
        info!(rule = fix.rule, id:% = fix.id; "Repaired element");
    }

    if let Some(path) = &args.apply {
        let ops: Vec<Operation> =
            serde_json::from_str(&fs::read_to_string(path)?).map_err(CodecError::from)?;
        let count = ops.len();
        for op in ops {
            repo.do_operation(op)?;
        }
        info!(path = path, operations = count; "Applied operations");
    }

    for step in 0..args.undo {
        if repo.undo()?.is_none() {
            warn!(requested = args.undo, undone = step; "Nothing left to undo");
            break;
        }
    }

    if let Some(query) = &args.select {
        for element in repo.select(query)? {
            writeln!(
                out,
                "{} {} {}",
                element.id(),
                element.type_name(),
                element.name().unwrap_or_default()
            )?;
        }
    }

    if let Some(output) = &args.output {
        fs::write(output, repo.save()?)?;
        info!(output_file = output; "Document written");
    }

    Ok(())
}
