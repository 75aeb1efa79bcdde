use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Key of the application level section inside `package.json`
const APP_CONFIG_KEY: &str = "cmake-addon";
const NPM_CONFIG_PREFIX: &str = "npm_config_";
const NPM_CMAKE_PREFIX: &str = "cmake_";

/// Application level settings read from a project's `package.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub runtime_version: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

fn read_package_json(dir: &Path) -> Option<serde_json::Value> {
    let path = dir.join("package.json");
    log::trace!("Looking for package.json in: {:?}", path);
    let data = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring unparsable {:?}: {}", path, e);
            None
        }
    }
}

fn config_in(dir: &Path) -> Option<AppConfig> {
    let json = read_package_json(dir)?;
    let section = json.get(APP_CONFIG_KEY)?;
    if !section.is_object() {
        return None;
    }
    match serde_json::from_value::<AppConfig>(section.clone()) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Invalid '{}' section in {:?}: {}", APP_CONFIG_KEY, dir, e);
            None
        }
    }
}

/// Walk from `project_root` up to the filesystem root and return the
/// outermost application config found.
///
/// Nested packages inherit from the workspace that contains them, so the
/// section closest to the root wins.
pub fn load_app_config(project_root: &Path) -> Option<AppConfig> {
    log::debug!(
        "Looking for application level config in '{}'",
        project_root.display()
    );
    let mut last = None;
    for dir in project_root.ancestors() {
        if let Some(config) = config_in(dir) {
            log::trace!("Config found in {:?}", dir);
            last = Some(config);
        }
    }
    match &last {
        Some(config) => log::debug!("Application level config found: {:?}", config),
        None => log::debug!("Application level config doesn't exist"),
    }
    last
}

/// True when the project declares Node-API versions (`binary.napi_versions`)
/// in its `package.json`; such projects compile against node-api-headers and
/// never need a runtime distribution.
pub fn is_node_api_project(project_root: &Path) -> bool {
    match read_package_json(project_root) {
        Some(json) => json
            .get("binary")
            .and_then(|b| b.get("napi_versions"))
            .map(|v| !v.is_null())
            .unwrap_or(false),
        None => {
            log::trace!("'package.json' not found in {:?}", project_root);
            false
        }
    }
}

/// Options npm exposes to child processes as `npm_config_*` variables
#[derive(Debug, Clone, Default)]
pub struct NpmConfig {
    options: BTreeMap<String, String>,
}

impl NpmConfig {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut options = BTreeMap::new();
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(NPM_CONFIG_PREFIX) else {
                continue;
            };
            if key.is_empty() || value.is_empty() {
                continue;
            }
            options.insert(key.to_string(), value);
        }
        log::trace!("NPM options: {:?}", options);
        Self { options }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Directory holding a locally provided runtime distribution
    pub fn nodedir(&self) -> Option<&str> {
        self.get("nodedir")
    }

    pub fn msvs_version(&self) -> Option<&str> {
        self.get("msvs_version")
    }

    /// `npm_config_cmake_<KEY>=<value>` pairs, turned into `-D<KEY>=<value>`
    pub fn cmake_definitions(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(NPM_CMAKE_PREFIX)
                    .filter(|k| !k.is_empty())
                    .map(|k| (k.to_string(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("package.json"), body).unwrap();
    }

    #[test]
    fn outermost_app_config_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let outer = tmp.path().join("workspace");
        let inner = outer.join("packages").join("addon");
        write(
            &outer,
            r#"{"name":"ws","cmake-addon":{"runtime":"electron","runtimeVersion":"28.0.0"}}"#,
        );
        write(
            &inner,
            r#"{"name":"addon","cmake-addon":{"runtime":"node","arch":"x64"}}"#,
        );

        let config = load_app_config(&inner).expect("config");
        assert_eq!(config.runtime.as_deref(), Some("electron"));
        assert_eq!(config.runtime_version.as_deref(), Some("28.0.0"));
        assert_eq!(config.arch, None);
    }

    #[test]
    fn missing_or_malformed_config_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("p");
        write(&dir, r#"{"name":"p","cmake-addon":"not an object"}"#);
        assert_eq!(config_in(&dir), None);

        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert_eq!(config_in(&empty), None);
    }

    #[test]
    fn detects_node_api_projects() {
        let tmp = tempfile::tempdir().unwrap();
        let napi = tmp.path().join("napi");
        write(&napi, r#"{"binary":{"napi_versions":[7]}}"#);
        assert!(is_node_api_project(&napi));

        let classic = tmp.path().join("classic");
        write(&classic, r#"{"name":"classic"}"#);
        assert!(!is_node_api_project(&classic));

        assert!(!is_node_api_project(&tmp.path().join("absent")));
    }

    #[test]
    fn npm_config_extracts_known_keys_and_cmake_definitions() {
        let vars = vec![
            ("npm_config_nodedir".to_string(), "/opt/node".to_string()),
            ("npm_config_msvs_version".to_string(), "2022".to_string()),
            ("npm_config_cmake_FOO".to_string(), "bar".to_string()),
            ("npm_config_cmake_".to_string(), "ignored".to_string()),
            ("npm_config_empty".to_string(), String::new()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let npm = NpmConfig::from_vars(vars);
        assert_eq!(npm.nodedir(), Some("/opt/node"));
        assert_eq!(npm.msvs_version(), Some("2022"));
        assert_eq!(npm.get("empty"), None);
        assert_eq!(
            npm.cmake_definitions(),
            vec![("FOO".to_string(), "bar".to_string())]
        );
    }
}
