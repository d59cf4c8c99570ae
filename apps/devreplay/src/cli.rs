//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "devreplay",
    version,
    about = "DevReplay: replay recorded code changes as lint fixes",
    long_about = "DevReplay lints source files against a catalog of before/after rewrite rules (.devreplay.json) and applies the recorded fixes.\n\nConfiguration precedence: CLI > devreplay.toml > defaults.",
    after_help = "Examples:\n  devreplay serve --stdio\n  devreplay lint 'src/**/*.js'\n  devreplay fix src/app.js --diff",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
/// Supported subcommands for serving, linting, and fixing.
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current devreplay version.")]
    Version,
    /// Run the language server
    #[command(
        about = "Run the language server",
        long_about = "Serve the Language Server Protocol over stdin/stdout. Logs go to stderr (DEVREPLAY_LOG controls the filter)."
    )]
    Serve {
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Use stdio transport (the only transport)")]
        stdio: bool,
    },
    /// Lint files against the rule catalog
    #[command(
        about = "Run lint checks",
        long_about = "Report every catalog rule match in the given files. Error-level findings make the command exit 1.",
        after_help = "Examples:\n  devreplay lint src/app.js\n  devreplay lint 'src/**/*.ts' --output json"
    )]
    Lint {
        #[arg(required = true, help = "Files or glob patterns to lint")]
        paths: Vec<String>,
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Catalog file used for every target (default: nearest .devreplay.json)")]
        catalog: Option<String>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
    /// Apply catalog fixes
    #[command(
        about = "Apply recorded fixes",
        long_about = "Rewrite files with every enabled catalog rule. When --diff or --check is set, write is disabled.",
        after_help = "Examples:\n  devreplay fix src/app.js --diff\n  devreplay fix 'src/**/*.js' --write"
    )]
    Fix {
        #[arg(required = true, help = "Files or glob patterns to fix")]
        paths: Vec<String>,
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Catalog file used for every target (default: nearest .devreplay.json)")]
        catalog: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Write changes to files")]
        write: bool,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Show diffs for changed files (implies write=false)")]
        diff: bool,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Exit non-zero if changes would occur (implies write=false)")]
        check: bool,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
    },
}
