use std::path::PathBuf;

use colored::Colorize;
use log::debug;

use crate::commands::Workspace;
use crate::config::location_to_path;
use crate::error::{Result, StoreError};
use crate::output::Format;

/// Copy all boards to `new_root`, optionally making it the active root.
/// The source is never modified.
pub fn run(
    ws: &mut Workspace,
    new_root: &str,
    from: Option<PathBuf>,
    switch: bool,
    format: Format,
) -> Result<()> {
    let old_root = from.unwrap_or_else(|| ws.root());
    let target = location_to_path(new_root.trim());

    let result = ws
        .config
        .migrate_boards(&old_root, &target, &mut |done, total| {
            debug!("copied {done}/{total} entries");
        });

    let switched = if result.success && switch {
        ws.config.set_boards_directory(new_root)?;
        true
    } else {
        false
    };

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "from": old_root,
                "to": target,
                "migration": result,
                "switched": switched,
            })
        ),
        Format::Pretty => {
            let status = if result.success { "ok".green() } else { "failed".red() };
            println!("{} {}", status.bold(), result.message);
            for err in &result.errors {
                println!("  {} {}", "error:".red(), err);
            }
            if switched {
                println!("  {} {}", "boards:".dimmed(), target.display());
            }
        }
        Format::Minimal => println!("{}", result.copied_files.unwrap_or(0)),
    }

    if !result.success {
        return Err(StoreError::Validation(result.message));
    }
    Ok(())
}
