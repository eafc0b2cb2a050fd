use crate::traits::FileSystem;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings file picked up from the working directory when no explicit path is given
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";

/// Runtime configuration loaded from `appsettings.json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Root of the template source (holds `TemplateSetting.json`)
    pub templates_dir: PathBuf,
    pub auth: AuthSettings,
    pub devops: DevOpsSettings,
}

/// Identity platform parameters for the device-code sign-in
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthSettings {
    pub client_id: String,
    pub authority: String,
    pub scopes: Vec<String>,
    pub profile_url: String,
    pub accounts_url: String,
}

/// Azure DevOps REST endpoints and provisioning knobs
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DevOpsSettings {
    pub base_url: String,
    pub extensions_url: String,
    pub api_version: String,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    /// Process template used when a template folder does not name one
    pub default_process: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("Templates"),
            auth: AuthSettings::default(),
            devops: DevOpsSettings::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            // Visual Studio public client, allowed to request Azure DevOps tokens
            client_id: "872cd9fa-d31f-45e0-9eab-6e460a02d1f1".to_string(),
            authority: "https://login.microsoftonline.com/organizations".to_string(),
            scopes: vec![
                "499b84ac-1321-427f-aa17-267ca6975798/.default".to_string(),
                "offline_access".to_string(),
            ],
            profile_url: "https://app.vssps.visualstudio.com/_apis/profile/profiles/me?api-version=7.1"
                .to_string(),
            accounts_url: "https://app.vssps.visualstudio.com/_apis/accounts".to_string(),
        }
    }
}

impl Default for DevOpsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://dev.azure.com".to_string(),
            extensions_url: "https://extmgmt.dev.azure.com".to_string(),
            api_version: "7.1".to_string(),
            poll_interval_secs: 2,
            max_poll_attempts: 60,
            default_process: "Agile".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from `appsettings.json` in
    /// the working directory when present, then apply environment overrides.
    pub fn load(fs: &dyn FileSystem, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !fs.is_file(path) {
                    anyhow::bail!("Settings file not found: {}", path.display());
                }
                Some(path.to_path_buf())
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_SETTINGS_FILE);
                fs.is_file(&default_path).then_some(default_path)
            }
        };

        let mut settings = match path {
            Some(path) => {
                let content = fs.read_to_string(&path)?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
            }
            None => Settings::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `DEMOGEN_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(client_id) = lookup("DEMOGEN_CLIENT_ID").filter(|v| !v.trim().is_empty()) {
            self.auth.client_id = client_id;
        }
        if let Some(authority) = lookup("DEMOGEN_AUTHORITY").filter(|v| !v.trim().is_empty()) {
            self.auth.authority = authority;
        }
    }

    /// Replace the template root when one was given on the command line
    pub fn with_templates_dir(mut self, templates_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = templates_dir {
            self.templates_dir = dir;
        }
        self
    }
}
