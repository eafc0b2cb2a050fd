use crate::messenger::Messenger;
use crate::traits::{FileSystem, UserInput};
use crate::validation::{extract_display_link, is_affirmative};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Per-template manifest listing the marketplace extensions it relies on
pub const EXTENSION_MANIFEST_FILE: &str = "Extensions.json";

#[derive(Debug, Deserialize)]
struct ExtensionManifest {
    #[serde(rename = "Extensions", default)]
    extensions: Option<Vec<ExtensionEntry>>,
}

/// A marketplace extension required by a template
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtensionEntry {
    #[serde(rename = "extensionName")]
    pub name: String,
    /// Raw link text, a URL or an anchor fragment
    #[serde(default)]
    pub link: String,
    #[serde(rename = "License", default)]
    pub license_link: String,
    #[serde(rename = "PublisherID", default)]
    pub publisher_id: Option<String>,
    #[serde(rename = "ExtensionID", default)]
    pub extension_id: Option<String>,
}

impl ExtensionEntry {
    /// Marketplace coordinates, when the manifest names both halves
    pub fn marketplace_id(&self) -> Option<(&str, &str)> {
        let publisher = self.publisher_id.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        let extension = self.extension_id.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some((publisher, extension))
    }
}

/// Extensions found for a template and whether the user agreed to them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionConsent {
    pub extensions: Vec<ExtensionEntry>,
    pub consent_granted: bool,
}

impl ExtensionConsent {
    pub fn extensions_present(&self) -> bool {
        !self.extensions.is_empty()
    }
}

/// Discovers a template's extensions and collects install/license consent
pub struct ExtensionAdvisor<'a> {
    fs: &'a dyn FileSystem,
    input: &'a dyn UserInput,
    root: PathBuf,
}

impl<'a> ExtensionAdvisor<'a> {
    pub fn new(fs: &'a dyn FileSystem, input: &'a dyn UserInput, root: &Path) -> Self {
        Self {
            fs,
            input,
            root: root.to_path_buf(),
        }
    }

    /// Extensions declared for a template folder; no manifest means none
    pub fn discover(&self, template_folder: &str) -> Result<Vec<ExtensionEntry>> {
        let manifest_path = self.root.join(template_folder).join(EXTENSION_MANIFEST_FILE);
        if !self.fs.is_file(&manifest_path) {
            return Ok(Vec::new());
        }

        let content = self.fs.read_to_string(&manifest_path)?;
        let manifest: ExtensionManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse extension manifest: {:?}", manifest_path))?;

        Ok(manifest.extensions.unwrap_or_default())
    }

    /// Show the extensions, then ask to install and, only after a yes, to
    /// accept the licenses. Blank answers mean yes. An empty list asks
    /// nothing and returns false.
    pub fn present_and_confirm(&self, msg: &Messenger<'_>, entries: &[ExtensionEntry]) -> Result<bool> {
        if entries.is_empty() {
            return Ok(false);
        }

        let output = msg.output();
        output.subsection("Required extensions");
        for entry in entries {
            output.key_value("Extension Name", &entry.name);
            output.key_value("Link", &extract_display_link(&entry.link));
            output.key_value("License", &extract_display_link(&entry.license_link));
            output.blank();
        }

        let proceed = self
            .input
            .text("Do you want to proceed with this extension? (yes/No): press enter to confirm")?;
        if !is_affirmative(&proceed) {
            msg.warning("Extension installation is not confirmed.");
            return Ok(false);
        }

        let license = self
            .input
            .text("Agreed for license? (yes/no): press enter to confirm")?;
        if !is_affirmative(&license) {
            msg.warning("License terms were not accepted; extensions will not be installed.");
            return Ok(false);
        }

        msg.success("Confirmed Extension installation");
        Ok(true)
    }

    /// Discover and confirm in one step
    pub fn review(&self, msg: &Messenger<'_>, template_folder: &str) -> Result<ExtensionConsent> {
        let extensions = self.discover(template_folder)?;
        let consent_granted = self.present_and_confirm(msg, &extensions)?;
        Ok(ExtensionConsent {
            extensions,
            consent_granted,
        })
    }
}
