use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env::{apply_env_overrides, substitute_env},
    error::{Error, Result},
    schema::LinkfetchConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "linkfetch.toml",
    "linkfetch.yaml",
    "linkfetch.yml",
    "linkfetch.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<LinkfetchConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config, then apply environment overrides.
///
/// Search order:
/// 1. `explicit` when given (a load failure there is an error)
/// 2. `./linkfetch.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/linkfetch/linkfetch.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `LinkfetchConfig::default()` when nothing is found or a
/// discovered file fails to parse.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<LinkfetchConfig> {
    let mut config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading explicit config");
            load_config(path)?
        },
        None => match find_config_file() {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                load_config(&path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    LinkfetchConfig::default()
                })
            },
            None => {
                debug!("no config file found, using defaults");
                LinkfetchConfig::default()
            },
        },
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Returns the user-global config directory (`~/.config/linkfetch/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "linkfetch").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<LinkfetchConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("linkfetch.toml");
        std::fs::write(&toml_path, "[downloads]\nworkers = 4\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().downloads.workers, 4);

        let yaml_path = dir.path().join("linkfetch.yaml");
        std::fs::write(&yaml_path, "downloads:\n  workers: 3\n").unwrap();
        assert_eq!(load_config(&yaml_path).unwrap().downloads.workers, 3);

        let json_path = dir.path().join("linkfetch.json");
        std::fs::write(&json_path, r#"{"downloads": {"workers": 5}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().downloads.workers, 5);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkfetch.ini");
        std::fs::write(&path, "workers=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_and_load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn substitutes_placeholders_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkfetch.toml");
        // Unknown placeholders are left verbatim.
        std::fs::write(&path, "[telegram]\ntoken = \"${LINKFETCH_UNSET_FOR_TEST}\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.telegram.token.expose_secret(),
            "${LINKFETCH_UNSET_FOR_TEST}"
        );
    }
}
