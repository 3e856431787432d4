//! Configuration validation.
//!
//! Checks a loaded [`LinkfetchConfig`] for values that would make the
//! service unusable (errors) or silently degrade it (warnings).

use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::schema::LinkfetchConfig;

/// Hard ceiling imposed by the Bot API on any upload, in MB.
const TRANSPORT_CEILING_MB: u64 = 2000;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "range", "network", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "downloads.workers"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
#[must_use]
pub fn validate(config: &LinkfetchConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.telegram.token.expose_secret().trim().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "telegram.token",
            "bot token is empty (set BOT_TOKEN or telegram.token)",
        );
    }

    if config.downloads.workers == 0 {
        result.push(
            Severity::Error,
            "range",
            "downloads.workers",
            "at least one worker slot is required",
        );
    }

    match config.downloads.max_file_size_mb {
        0 => result.push(
            Severity::Error,
            "range",
            "downloads.max_file_size_mb",
            "size ceiling must be greater than zero",
        ),
        mb if mb > TRANSPORT_CEILING_MB => result.push(
            Severity::Warning,
            "range",
            "downloads.max_file_size_mb",
            format!("{mb} MB exceeds the {TRANSPORT_CEILING_MB} MB upload ceiling"),
        ),
        _ => {},
    }

    if config.network.allow_download_via_proxy && config.network.download_proxy().is_none() {
        result.push(
            Severity::Warning,
            "network",
            "network.allow_download_via_proxy",
            "downloads via proxy enabled but no proxy_url is configured",
        );
    }

    if let Some(path) = config.extractor.cookie_file.as_ref().filter(|p| !p.exists()) {
        result.push(
            Severity::Warning,
            "file-ref",
            "extractor.cookie_file",
            format!("cookie file not found: {}", path.display()),
        );
    }

    if config.telegram.large_file_api_url.is_none()
        && config.downloads.max_file_size_mb > config.delivery.inline_limit_mb
    {
        result.push(
            Severity::Warning,
            "network",
            "telegram.large_file_api_url",
            format!(
                "no large-file server configured; artifacts above {} MB cannot be delivered",
                config.delivery.inline_limit_mb
            ),
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn usable() -> LinkfetchConfig {
        let mut cfg = LinkfetchConfig::default();
        cfg.telegram.token = Secret::new("123:ABC".into());
        cfg.telegram.large_file_api_url = Some("http://127.0.0.1:8081".into());
        cfg
    }

    #[test]
    fn usable_config_has_no_diagnostics() {
        let result = validate(&usable());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn empty_token_is_an_error() {
        let result = validate(&LinkfetchConfig::default());
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "telegram.token" && d.severity == Severity::Error)
        );
    }

    #[test]
    fn zero_workers_and_zero_ceiling_are_errors() {
        let mut cfg = usable();
        cfg.downloads.workers = 0;
        cfg.downloads.max_file_size_mb = 0;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn oversized_ceiling_warns() {
        let mut cfg = usable();
        cfg.downloads.max_file_size_mb = 4000;
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(result.diagnostics[0].path, "downloads.max_file_size_mb");
    }

    #[test]
    fn proxy_opt_in_without_proxy_warns() {
        let mut cfg = usable();
        cfg.network.allow_download_via_proxy = true;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(result.diagnostics[0].category, "network");
    }

    #[test]
    fn missing_cookie_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = usable();
        cfg.extractor.cookie_file = Some(dir.path().join("cookies.txt"));
        assert_eq!(validate(&cfg).count(Severity::Warning), 1);

        std::fs::write(dir.path().join("cookies.txt"), "# Netscape HTTP Cookie File\n").unwrap();
        assert!(validate(&cfg).diagnostics.is_empty());
    }

    #[test]
    fn missing_large_file_server_warns_only_when_needed() {
        let mut cfg = usable();
        cfg.telegram.large_file_api_url = None;
        assert_eq!(validate(&cfg).count(Severity::Warning), 1);

        cfg.downloads.max_file_size_mb = 50;
        assert!(validate(&cfg).diagnostics.is_empty());
    }
}
