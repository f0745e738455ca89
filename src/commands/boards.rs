use std::path::PathBuf;

use colored::Colorize;

use crate::commands::Workspace;
use crate::error::Result;
use crate::output::Format;

pub fn run(ws: &mut Workspace, dir: Option<PathBuf>, format: Format) -> Result<()> {
    let dir = dir.unwrap_or_else(|| ws.root());
    let boards = ws.config.list_boards(Some(&dir))?;
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({ "directory": dir, "boards": boards })
        ),
        Format::Pretty => {
            if boards.is_empty() {
                println!("{}", format!("No boards in {}.", dir.display()).dimmed());
            }
            for board in &boards {
                println!("{}", board.cyan());
            }
        }
        Format::Minimal => {
            for board in &boards {
                println!("{board}");
            }
        }
    }
    Ok(())
}
