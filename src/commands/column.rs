use colored::Colorize;

use crate::commands::Workspace;
use crate::error::Result;
use crate::model::ColumnRecord;
use crate::output::Format;
use crate::store::paths;

pub fn save(
    ws: &mut Workspace,
    board: &str,
    name: &str,
    position: i64,
    limit: Option<u32>,
    format: Format,
) -> Result<()> {
    let root = ws.prepare_board(board)?;
    let slug = paths::safe_name(name);
    let created_at = ws
        .store
        .load_board(&root, board)?
        .and_then(|snapshot| snapshot.columns.into_iter().find(|col| col.slug == slug))
        .and_then(|col| col.column.created_at);

    let mut column = ColumnRecord::new(name, position);
    column.limit = limit;
    column.created_at = created_at;
    let path = ws.store.save_column_metadata(&root, board, &column)?;

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({ "column": column, "slug": slug, "path": path })
        ),
        Format::Pretty => println!(
            "Saved column {} at position {}",
            column.name.green().bold(),
            column.position
        ),
        Format::Minimal => println!("{}", path.display()),
    }
    Ok(())
}
