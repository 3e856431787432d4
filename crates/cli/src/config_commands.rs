use std::path::Path;

use {
    anyhow::Result,
    linkfetch_config::{Diagnostic, LinkfetchConfig, Severity, validate},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn check(config: &LinkfetchConfig, explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let mut result = validate(config);
    result.config_path = explicit
        .map(Path::to_path_buf)
        .or_else(linkfetch_config::find_config_file);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    if which::which(&config.extractor.binary).is_err() {
        result.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "missing",
            path: "extractor.binary".into(),
            message: format!(
                "`{}` not found on PATH; video-site links will fail",
                config.extractor.binary
            ),
        });
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        eprintln!("  {}", render(d));
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn render(d: &Diagnostic) -> String {
    let (color, label) = match d.severity {
        Severity::Error => (RED, "error"),
        Severity::Warning => (YELLOW, "warning"),
        Severity::Info => (CYAN, "info"),
    };

    if d.path.is_empty() {
        format!("{BOLD}{color}{label}{RESET} {}", d.message)
    } else {
        format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
    }
}
