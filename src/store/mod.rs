pub mod board;
pub mod files;
pub mod frontmatter;
pub mod migration;
pub mod paths;
