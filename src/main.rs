use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mkanban::commands::{self, Workspace};
use mkanban::output::Format;

#[derive(Parser)]
#[command(
    name = "mkanban",
    version,
    about = "Kanban boards stored as plain markdown files"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Directory holding .mkanban/config.json and the default boards root
    #[arg(long, global = true, value_name = "DIR")]
    documents_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, config file and boards root
    Init,
    /// Show or change where boards are stored
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List boards in the active root (or --dir)
    Boards {
        /// Directory to list instead of the configured root
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show, save or delete a board
    Board {
        #[command(subcommand)]
        action: BoardAction,
    },
    /// Manage column metadata
    Column {
        #[command(subcommand)]
        action: ColumnAction,
    },
    /// Save, delete or move tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Delete task folders whose IDs are not listed
    Cleanup {
        board: String,
        column: String,
        /// Task IDs that are still live (comma-separated)
        #[arg(long, value_delimiter = ',')]
        keep: Vec<String>,
    },
    /// Upgrade flat task files to the folder-per-task layout
    MigrateLayout {
        /// Only this board (default: every board in the root)
        board: Option<String>,
    },
    /// Copy every board to a new root directory
    Relocate {
        /// Destination directory (plain path, file:// or content:// URI)
        new_root: String,
        /// Source root (default: the active root)
        #[arg(long)]
        from: Option<PathBuf>,
        /// Make the destination the active root after a successful copy
        #[arg(long)]
        switch: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Use a custom boards directory
    Set {
        /// Directory path or URI
        path: String,
    },
    /// Go back to the default boards directory
    Reset,
}

#[derive(Subcommand)]
enum BoardAction {
    /// Print a board with its columns and tasks
    Show { board: String },
    /// Create or update board.md
    Save {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a board directory and everything in it
    Delete { board: String },
}

#[derive(Subcommand)]
enum ColumnAction {
    /// Write column.md
    Save {
        board: String,
        column: String,
        /// Display position (0 = leftmost)
        #[arg(long)]
        position: i64,
        /// Work-in-progress limit
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create or update a task
    Save {
        board: String,
        column: String,
        title: String,
        /// Existing task ID (a new one is generated if omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        parent_id: Option<String>,
        /// Extra frontmatter field as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Delete a task folder
    Delete {
        board: String,
        column: String,
        id: String,
    },
    /// Move a task to another column
    Move {
        board: String,
        from: String,
        to: String,
        id: String,
    },
}

fn run(cli: Cli, format: Format) -> mkanban::error::Result<()> {
    let mut ws = Workspace::open(cli.documents_dir)?;

    match cli.command {
        Commands::Init => commands::init::run(&mut ws, format),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&mut ws, format),
            ConfigAction::Set { path } => commands::config::set(&mut ws, &path, format),
            ConfigAction::Reset => commands::config::reset(&mut ws, format),
        },
        Commands::Boards { dir } => commands::boards::run(&mut ws, dir, format),
        Commands::Board { action } => match action {
            BoardAction::Show { board } => commands::board::show(&mut ws, &board, format),
            BoardAction::Save { name, description } => {
                commands::board::save(&mut ws, &name, description, format)
            }
            BoardAction::Delete { board } => commands::board::delete(&mut ws, &board, format),
        },
        Commands::Column { action } => match action {
            ColumnAction::Save {
                board,
                column,
                position,
                limit,
            } => commands::column::save(&mut ws, &board, &column, position, limit, format),
        },
        Commands::Task { action } => match action {
            TaskAction::Save {
                board,
                column,
                title,
                id,
                description,
                parent_id,
                set,
            } => commands::task::save(
                &mut ws,
                &board,
                &column,
                &title,
                commands::task::TaskFields {
                    id,
                    description,
                    parent_id,
                    set,
                },
                format,
            ),
            TaskAction::Delete { board, column, id } => {
                commands::task::delete(&mut ws, &board, &column, &id, format)
            }
            TaskAction::Move {
                board,
                from,
                to,
                id,
            } => commands::task::move_task(&mut ws, &board, &from, &to, &id, format),
        },
        Commands::Cleanup {
            board,
            column,
            keep,
        } => commands::cleanup::run(&mut ws, &board, &column, keep, format),
        Commands::MigrateLayout { board } => {
            commands::migrate_layout::run(&mut ws, board.as_deref(), format)
        }
        Commands::Relocate {
            new_root,
            from,
            switch,
        } => commands::relocate::run(&mut ws, &new_root, from, switch, format),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string()
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn task_save_collects_repeated_set_flags() {
        let cli = Cli::try_parse_from([
            "mkanban", "task", "save", "b", "todo", "Title", "--set", "a=1", "--set", "b=two",
        ])
        .unwrap();
        match cli.command {
            Commands::Task {
                action: TaskAction::Save { set, id, .. },
            } => {
                assert_eq!(set, vec!["a=1", "b=two"]);
                assert_eq!(id, None);
            }
            _ => panic!("expected task save"),
        }
    }

    #[test]
    fn cleanup_keep_is_comma_separated() {
        let cli = Cli::try_parse_from(["mkanban", "cleanup", "b", "todo", "--keep", "T-1,T-2"])
            .unwrap();
        match cli.command {
            Commands::Cleanup { keep, .. } => assert_eq!(keep, vec!["T-1", "T-2"]),
            _ => panic!("expected cleanup"),
        }
    }
}
