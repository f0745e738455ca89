use crate::commands::Workspace;
use crate::error::Result;
use crate::output::{self, Format};
use crate::store::paths;

/// Upgrade one board, or every board under the root, to folder-per-task.
pub fn run(ws: &mut Workspace, board: Option<&str>, format: Format) -> Result<()> {
    let root = ws.root();
    let reports = match board {
        Some(board) => vec![
            ws.migration
                .migrate_board_if_needed(&paths::board_dir(&root, board))?,
        ],
        None => ws.migration.migrate_root_if_needed(&root)?,
    };
    output::print_migration_reports(&reports, format)
}
