use colored::Colorize;

use crate::commands::Workspace;
use crate::error::Result;
use crate::output::Format;

pub fn run(ws: &mut Workspace, format: Format) -> Result<()> {
    ws.store.fs().initialize()?;
    let custom = ws.config.is_using_custom_directory();
    let root = ws.root();
    ws.store.fs().ensure_dir(&root)?;

    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({
                "documents_dir": ws.config.documents_dir(),
                "config_path": ws.config.config_path(),
                "boards_directory": root,
                "custom": custom,
            })
        ),
        Format::Pretty => {
            println!("Initialized mkanban in {}", ws.config.documents_dir().display());
            println!("  {} {}", "boards:".dimmed(), root.display());
            println!("  {} {}", "config:".dimmed(), ws.config.config_path().display());
        }
        Format::Minimal => println!("{}", root.display()),
    }
    Ok(())
}
