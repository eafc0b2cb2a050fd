use crate::error::ProvisionError;
use crate::traits::FileSystem;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Index file at the root of the template source
pub const TEMPLATE_INDEX_FILE: &str = "TemplateSetting.json";

#[derive(Debug, Deserialize)]
struct TemplateIndex {
    #[serde(rename = "GroupwiseTemplates")]
    groups: Option<Vec<TemplateGroup>>,
}

/// A named group of templates, in index order
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TemplateGroup {
    #[serde(rename = "Groups", default)]
    pub group_name: String,
    #[serde(rename = "Template", default)]
    pub templates: Vec<TemplateEntry>,
}

/// One provisionable template as declared in the index
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TemplateEntry {
    #[serde(rename = "Name")]
    pub name: String,
    /// Folder relative to the template root
    #[serde(rename = "TemplateFolder", default)]
    pub template_folder: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "ConfirmExtension", default)]
    pub requires_extension_confirmation: bool,
}

/// A numbered entry of the flattened selection list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectableTemplate {
    /// 1-based, in index order across all groups
    pub index: usize,
    pub group: String,
    pub name: String,
}

/// A template that passed resolution: the name matched and the folder exists
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
    pub name: String,
    pub folder: String,
    pub path: PathBuf,
    pub description: Option<String>,
    pub requires_confirmation: bool,
}

/// Template groups loaded from the index of one template root
pub struct TemplateCatalog<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
    groups: Vec<TemplateGroup>,
}

impl<'a> TemplateCatalog<'a> {
    /// Read and parse `TemplateSetting.json` under `root`
    pub fn load(fs: &'a dyn FileSystem, root: &Path) -> Result<Self, ProvisionError> {
        let index_path = root.join(TEMPLATE_INDEX_FILE);
        if !fs.is_file(&index_path) {
            return Err(ProvisionError::CatalogMissing(index_path));
        }

        let content = fs
            .read_to_string(&index_path)
            .map_err(|e| ProvisionError::CatalogInvalid(format!("{:#}", e)))?;
        let index: TemplateIndex = serde_json::from_str(&content)?;

        let groups = index
            .groups
            .ok_or_else(|| ProvisionError::CatalogInvalid("No templates found.".to_string()))?;

        Ok(Self {
            fs,
            root: root.to_path_buf(),
            groups,
        })
    }

    /// Every template across all groups, numbered from 1 in index order
    pub fn list_selectable(&self) -> Vec<SelectableTemplate> {
        self.groups
            .iter()
            .flat_map(|group| {
                group
                    .templates
                    .iter()
                    .map(move |template| (group.group_name.as_str(), template.name.as_str()))
            })
            .enumerate()
            .map(|(i, (group, name))| SelectableTemplate {
                index: i + 1,
                group: group.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    /// Name shown at a 1-based list position
    pub fn name_at(&self, index: usize) -> Option<String> {
        self.list_selectable()
            .into_iter()
            .find(|entry| entry.index == index)
            .map(|entry| entry.name)
    }

    /// Case-insensitive exact lookup; the first match wins and its folder
    /// must exist under the template root.
    pub fn resolve(&self, name: &str) -> Result<ResolvedTemplate, ProvisionError> {
        let wanted = name.trim().to_lowercase();
        let entry = self
            .groups
            .iter()
            .flat_map(|group| group.templates.iter())
            .find(|template| template.name.trim().to_lowercase() == wanted)
            .ok_or_else(|| ProvisionError::TemplateNotFound(name.trim().to_string()))?;

        let folder = entry.template_folder.trim();
        let path = self.root.join(folder);
        if folder.is_empty() || !self.fs.is_dir(&path) {
            return Err(ProvisionError::FolderMissing {
                template: entry.name.clone(),
                folder: folder.to_string(),
            });
        }

        Ok(ResolvedTemplate {
            name: entry.name.clone(),
            folder: folder.to_string(),
            path,
            description: entry.description.clone(),
            requires_confirmation: entry.requires_extension_confirmation,
        })
    }
}
