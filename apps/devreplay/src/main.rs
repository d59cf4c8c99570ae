//! DevReplay binary entry point.
//! Delegates to the library for serve/lint/fix and prints results.

use clap::Parser;
use devreplay::cli::{Cli, Commands};
use devreplay::{config, fix, lint, output, server};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEVREPLAY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries protocol traffic under `serve`
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> eyre::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Serve { stdio: _ } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(server::run_stdio())?;
        }
        Commands::Lint {
            paths,
            repo_root,
            catalog,
            output,
        } => {
            let eff = config::resolve_effective(
                repo_root.as_deref(),
                catalog.as_deref(),
                output.as_deref(),
            );
            if let Some(p) = eff.catalog_path.as_deref().filter(|p| !p.exists()) {
                eprintln!(
                    "{} Catalog file not found: {}",
                    output::error_prefix(),
                    p.display()
                );
                std::process::exit(2);
            }
            let (files, mut errors) = lint::expand_targets(&eff.repo_root, &paths);
            let invoker = lint::LintInvoker::default();
            let (result, lint_errors) = lint::run_lint(
                &invoker,
                &eff.repo_root,
                &files,
                eff.catalog_path.as_deref(),
                &eff.catalog_name,
                &eff.severity,
            );
            errors.extend(lint_errors);
            output::print_lint(&result, &eff.output, &errors);
            if result.summary.errors > 0 {
                std::process::exit(1);
            }
        }
        Commands::Fix {
            paths,
            repo_root,
            catalog,
            write,
            diff,
            check,
            output,
        } => {
            let eff = config::resolve_effective(
                repo_root.as_deref(),
                catalog.as_deref(),
                output.as_deref(),
            );
            if let Some(p) = eff.catalog_path.as_deref().filter(|p| !p.exists()) {
                eprintln!(
                    "{} Catalog file not found: {}",
                    output::error_prefix(),
                    p.display()
                );
                std::process::exit(2);
            }
            // --diff and --check never write
            let eff_write = write && !(diff || check);
            let (files, mut errors) = lint::expand_targets(&eff.repo_root, &paths);
            let (results, fix_errors) = fix::run_fix(
                &eff.repo_root,
                &files,
                eff.catalog_path.as_deref(),
                &eff.catalog_name,
                &eff.severity,
                eff_write,
                diff || check,
            );
            errors.extend(fix_errors);
            output::print_fix(&results, &eff.output, eff_write, diff, &errors);
            if check && results.iter().any(|r| r.changed) {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
