//! Environment handling: `${VAR}` placeholders in the raw config text and
//! the deployment variables that override parsed values.

use std::path::PathBuf;

use {secrecy::Secret, tracing::debug};

use crate::schema::LinkfetchConfig;

/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Malformed or empty placeholder, emit literally.
                out.push_str("${");
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}

/// Apply deployment overrides from the process environment.
pub fn apply_env_overrides(config: &mut LinkfetchConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_overrides_with(config: &mut LinkfetchConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

    if let Some(token) = get("BOT_TOKEN").filter(|v| !v.is_empty()) {
        config.telegram.token = Secret::new(token);
    }
    if let Some(proxy) = get("PROXY_URL").filter(|v| !v.is_empty()) {
        config.network.proxy_url = Some(Secret::new(proxy));
    }
    if let Some(flag) = get("ALLOW_DOWNLOAD_VIA_PROXY") {
        config.network.allow_download_via_proxy = parse_flag(&flag);
    }
    if let Some(flag) = get("DIRECT_SEND_ONLY") {
        config.downloads.direct_send_only = parse_flag(&flag);
    }
    if let Some(raw) = get("MAX_FILE_SIZE_MB") {
        match raw.parse::<u64>() {
            Ok(mb) => config.downloads.max_file_size_mb = mb,
            Err(e) => debug!(value = %raw, error = %e, "ignoring invalid MAX_FILE_SIZE_MB"),
        }
    }
    if let Some(path) = get("YTDLP_COOKIES").filter(|v| !v.is_empty()) {
        config.extractor.cookie_file = Some(PathBuf::from(path));
    }
    if let Some(header) = get("YTDLP_COOKIE_HEADER").filter(|v| !v.is_empty()) {
        config.extractor.cookie_header = Some(Secret::new(header));
    }
    if let Some(url) = get("LARGE_FILE_API_URL").filter(|v| !v.is_empty()) {
        config.telegram.large_file_api_url = Some(url);
    }
}

/// `1`, `true`, `yes` and `on` (any case) are truthy; everything else is false.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
