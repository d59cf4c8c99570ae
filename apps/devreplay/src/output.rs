//! Output rendering for the `lint` and `fix` commands.
//!
//! Supports `human` (default) and `json` outputs. The JSON form includes
//! per-item fields, a top-level summary, and any per-file errors.

use crate::fix::FixResult;
use crate::models::LintResult;
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

pub fn error_prefix() -> String {
    if use_colors("human") {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

fn print_errors(errors: &[String]) {
    for e in errors {
        eprintln!("{} {}", error_prefix(), e);
    }
}

/// Print lint results in the requested format.
pub fn print_lint(res: &LintResult, output: &str, errors: &[String]) {
    match output {
        "json" => println!("{}", compose_lint_json(res, errors)),
        _ => {
            let color = use_colors(output);
            for is in &res.issues {
                let tag = format!("⟦{}⟧", is.severity);
                let sev = if !color {
                    tag
                } else {
                    match is.severity.as_str() {
                        "error" => tag.red().bold().to_string(),
                        "warn" => tag.yellow().bold().to_string(),
                        "info" => tag.blue().bold().to_string(),
                        _ => tag.bright_black().to_string(),
                    }
                };
                let loc = format!("{}:{}:{}", is.file, is.line, is.character);
                let loc = if color { loc.bold().to_string() } else { loc };
                if is.rule.is_empty() {
                    println!("{} {} {}", sev, loc, is.message);
                } else {
                    println!("{} {} ❲{}❳ {}", sev, loc, is.rule, is.message);
                }
            }
            let summary = format!(
                "Summary: errors={} warnings={} infos={} hints={} files={}",
                res.summary.errors,
                res.summary.warnings,
                res.summary.infos,
                res.summary.hints,
                res.summary.files
            );
            if color {
                println!("{}", summary.bold());
            } else {
                println!("{}", summary);
            }
            print_errors(errors);
        }
    }
}

/// Print fix results. Without `write`, previews (or diffs) of changed files
/// are shown; with it, only file statuses.
pub fn print_fix(results: &[FixResult], output: &str, write: bool, diff: bool, errors: &[String]) {
    match output {
        "json" => println!("{}", compose_fix_json(results, write, diff, errors)),
        _ => {
            let color = use_colors(output);
            for r in results {
                if !r.changed {
                    if color {
                        println!("{} {}", "no changes:".bright_black(), r.file);
                    } else {
                        println!("no changes: {}", r.file);
                    }
                    continue;
                }
                if write {
                    if color {
                        println!("{} {}", "fixed:".green().bold(), r.file.bold());
                    } else {
                        println!("fixed: {}", r.file);
                    }
                    continue;
                }
                let body = if diff {
                    build_naive_diff(r.original.as_deref(), r.preview.as_deref())
                        .or_else(|| r.preview.clone())
                } else {
                    r.preview.clone()
                };
                if let Some(body) = body {
                    if color {
                        println!("{} {}\n{}", "---".cyan().bold(), r.file.bold(), body);
                    } else {
                        println!("--- {}\n{}", r.file, body);
                    }
                }
            }
            print_errors(errors);
        }
    }
}

fn build_naive_diff(old: Option<&str>, new: Option<&str>) -> Option<String> {
    let old = old?;
    let new = new?;
    let mut out = String::new();
    for (o, n) in old.lines().zip(new.lines()) {
        if o != n {
            out.push_str(&format!("-{}\n+{}\n", o, n));
        }
    }
    let (ol, nl) = (old.lines().count(), new.lines().count());
    for o in old.lines().skip(nl) {
        out.push_str(&format!("-{}\n", o));
    }
    for n in new.lines().skip(ol) {
        out.push_str(&format!("+{}\n", n));
    }
    Some(out)
}

/// Compose lint JSON object (pure) for testing/snapshot purposes.
pub fn compose_lint_json(res: &LintResult, errors: &[String]) -> JsonVal {
    json!({
        "issues": res.issues,
        "summary": res.summary,
        "errors": errors,
    })
}

/// Compose fix JSON object (pure) for testing/snapshot purposes.
pub fn compose_fix_json(results: &[FixResult], write: bool, diff: bool, errors: &[String]) -> JsonVal {
    let items: Vec<_> = results
        .iter()
        .map(|r| {
            json!({
                "file": r.file,
                "changed": r.changed,
                "wrote": write && r.changed,
                "preview": if !write { r.preview.as_ref() } else { None },
                "diff": if diff && !write { build_naive_diff(r.original.as_deref(), r.preview.as_deref()) } else { None }
            })
        })
        .collect();
    let summary = json!({
        "changed": results.iter().filter(|r| r.changed).count(),
        "total": results.len(),
        "wrote": if write { results.iter().filter(|r| r.changed).count() } else { 0 },
    });
    json!({"results": items, "summary": summary, "errors": errors})
}
