use clap::ValueEnum;
use colored::Colorize;

use crate::error::Result;
use crate::model::{BoardSnapshot, TaskRecord, format_timestamp};
use crate::store::migration::MigrationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

pub fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() > max_len {
        let truncated: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    }
}

pub fn print_task(task: &TaskRecord, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(task)?),
        Format::Pretty => print_task_pretty(task, ""),
        Format::Minimal => println!("{:12} {}", task.id, truncate_title(&task.title, 40)),
    }
    Ok(())
}

fn print_task_pretty(task: &TaskRecord, indent: &str) {
    println!(
        "{indent}{} {}",
        format!("[{}]", task.id).cyan().bold(),
        task.title
    );
    if !task.description.is_empty() {
        for line in task.description.lines() {
            println!("{indent}  {}", line);
        }
    }
    if let Some(ref parent) = task.parent_id {
        println!("{indent}  {} {}", "parent:".dimmed(), parent);
    }
    if let Some(ts) = task.moved_in_progress_at {
        println!("{indent}  {} {}", "started:".dimmed(), format_timestamp(&ts));
    }
    if let Some(ts) = task.moved_in_done_at {
        println!("{indent}  {} {}", "finished:".dimmed(), format_timestamp(&ts));
    }
    if let Some(ref worked) = task.worked_on_for {
        println!("{indent}  {} {}", "worked:".dimmed(), worked);
    }
}

pub fn print_board(board: &BoardSnapshot, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(board)?),
        Format::Pretty => {
            println!("{} {}", board.board.name.bold(), format!("({})", board.slug).dimmed());
            if !board.board.description.is_empty() {
                println!("  {}", board.board.description);
            }
            for parent in &board.board.parents {
                println!("  {} {} [{}]", "parent:".dimmed(), parent.name, parent.color);
            }
            for column in &board.columns {
                let limit = column
                    .column
                    .limit
                    .map(|limit| format!("/{limit}"))
                    .unwrap_or_default();
                println!();
                println!(
                    "{} {}",
                    column.column.name.green().bold(),
                    format!("{}{limit}", column.tasks.len()).dimmed()
                );
                if column.tasks.is_empty() {
                    println!("  {}", "(empty)".dimmed());
                }
                for task in &column.tasks {
                    print_task_pretty(task, "  ");
                }
            }
        }
        Format::Minimal => {
            println!("{:12} {:14} TITLE", "ID", "COLUMN");
            println!("{}", "-".repeat(50));
            for column in &board.columns {
                for task in &column.tasks {
                    println!(
                        "{:12} {:14} {}",
                        task.id,
                        truncate_title(&column.slug, 14),
                        truncate_title(&task.title, 40)
                    );
                }
            }
        }
    }
    Ok(())
}

pub fn print_migration_reports(reports: &[MigrationReport], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(reports)?),
        Format::Pretty => {
            if reports.is_empty() {
                println!("{}", "No boards to migrate.".dimmed());
            }
            for report in reports {
                if report.already_migrated {
                    println!("{} {}", report.board.cyan(), "already migrated".dimmed());
                    continue;
                }
                println!(
                    "{} {} tasks moved, {} folders relocated",
                    report.board.cyan().bold(),
                    report.migrated_tasks,
                    report.relocated_folders
                );
                for failure in &report.failures {
                    println!("  {} {}", "failed:".red(), failure);
                }
            }
        }
        Format::Minimal => {
            for report in reports {
                println!(
                    "{} {} {} {}",
                    report.board,
                    report.migrated_tasks,
                    report.relocated_folders,
                    report.failures.len()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_title_marks_cut_titles() {
        assert_eq!(truncate_title("short", 12), "short");
        assert_eq!(truncate_title("a rather long title", 10), "a rathe...");
        assert_eq!(truncate_title("abc", 2), "...");
    }
}
