use colored::Colorize;

use crate::commands::Workspace;
use crate::error::{Result, StoreError};
use crate::model::BoardRecord;
use crate::output::{self, Format};

pub fn show(ws: &mut Workspace, name: &str, format: Format) -> Result<()> {
    let root = ws.prepare_board(name)?;
    let Some(board) = ws.store.load_board(&root, name)? else {
        return Err(StoreError::NotFound(ws.store.board_file_path(&root, name)));
    };
    output::print_board(&board, format)
}

/// Create or update `board.md`, keeping stored fields the caller did not pass.
pub fn save(
    ws: &mut Workspace,
    name: &str,
    description: Option<String>,
    format: Format,
) -> Result<()> {
    let root = ws.prepare_board(name)?;
    let mut board = match ws.store.load_board(&root, name)? {
        Some(existing) => existing.board,
        None => BoardRecord::new(name),
    };
    board.name = name.to_string();
    if let Some(description) = description {
        board.description = description;
    }
    let path = ws.store.save_board_metadata(&root, &board)?;

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({ "board": board, "path": path })
        ),
        Format::Pretty => println!(
            "Saved board {} at {}",
            board.name.cyan().bold(),
            path.display()
        ),
        Format::Minimal => println!("{}", path.display()),
    }
    Ok(())
}

pub fn delete(ws: &mut Workspace, name: &str, format: Format) -> Result<()> {
    let root = ws.root();
    let deleted = ws.store.delete_board(&root, name)?;
    match format {
        Format::Json => println!("{}", serde_json::json!({ "board": name, "deleted": deleted })),
        Format::Pretty if deleted => println!("Deleted board {}", name.cyan()),
        Format::Pretty => println!("{}", format!("No board named {name}.").dimmed()),
        Format::Minimal => println!("{deleted}"),
    }
    Ok(())
}
