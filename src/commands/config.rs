use colored::Colorize;
use serde::Serialize;

use crate::commands::Workspace;
use crate::error::Result;
use crate::output::Format;

#[derive(Serialize)]
struct ConfigView {
    version: String,
    #[serde(rename = "boardsDirectory", skip_serializing_if = "Option::is_none")]
    stored: Option<String>,
    boards_directory: String,
    default_boards_directory: String,
    custom: bool,
    config_path: String,
}

fn view(ws: &mut Workspace) -> ConfigView {
    let config = ws.config.full_config();
    ConfigView {
        version: config.version,
        custom: config.boards_directory.is_some(),
        stored: config.boards_directory,
        boards_directory: ws.root().display().to_string(),
        default_boards_directory: ws.config.default_boards_directory().display().to_string(),
        config_path: ws.config.config_path().display().to_string(),
    }
}

fn print(view: &ConfigView, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(view)?),
        Format::Pretty => {
            let label = if view.custom { "custom".yellow() } else { "default".green() };
            println!("{} ({})", view.boards_directory.bold(), label);
            println!("  {} {}", "default:".dimmed(), view.default_boards_directory);
            println!("  {} {}", "config:".dimmed(), view.config_path);
            println!("  {} {}", "version:".dimmed(), view.version);
        }
        Format::Minimal => println!("{}", view.boards_directory),
    }
    Ok(())
}

pub fn show(ws: &mut Workspace, format: Format) -> Result<()> {
    let view = view(ws);
    print(&view, format)
}

pub fn set(ws: &mut Workspace, location: &str, format: Format) -> Result<()> {
    ws.config.set_boards_directory(location)?;
    let view = view(ws);
    print(&view, format)
}

pub fn reset(ws: &mut Workspace, format: Format) -> Result<()> {
    ws.config.reset_to_default()?;
    let view = view(ws);
    print(&view, format)
}
