use std::collections::HashSet;

use colored::Colorize;

use crate::commands::Workspace;
use crate::error::Result;
use crate::output::Format;

pub fn run(
    ws: &mut Workspace,
    board: &str,
    column: &str,
    keep: Vec<String>,
    format: Format,
) -> Result<()> {
    let root = ws.prepare_board(board)?;
    let live: HashSet<String> = keep
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    let summary = ws.store.cleanup_column(&root, board, column, &live)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string(&summary)?),
        Format::Pretty => {
            println!(
                "Removed {} orphaned tasks, kept {}",
                summary.removed.len().to_string().bold(),
                summary.kept
            );
            for id in &summary.removed {
                println!("  {} {}", "removed:".dimmed(), id);
            }
            for folder in &summary.skipped {
                println!("  {} {}", "skipped:".yellow(), folder.display());
            }
        }
        Format::Minimal => {
            for id in &summary.removed {
                println!("{id}");
            }
        }
    }
    Ok(())
}
