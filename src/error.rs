use std::fmt;
use std::path::PathBuf;

/// Failures the provisioning loop knows how to report or recover from
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionError {
    /// The template index file does not exist
    CatalogMissing(PathBuf),

    /// The template index exists but cannot be used
    CatalogInvalid(String),

    /// No template with this name in the catalog
    TemplateNotFound(String),

    /// The template matched but its folder is absent from the template source
    FolderMissing { template: String, folder: String },

    /// Federated sign-in or organization discovery failed
    AuthFailure(String),

    /// A required field is empty or malformed
    ValidationError(String),

    /// The environment-creation service reported failure
    ProvisioningFailure(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::CatalogMissing(path) => {
                write!(f, "Template index not found: {}", path.display())
            }
            ProvisionError::CatalogInvalid(msg) => {
                write!(f, "Template index is not usable: {}", msg)
            }
            ProvisionError::TemplateNotFound(name) => {
                write!(f, "Template '{}' not found in the list.", name)
            }
            ProvisionError::FolderMissing { template, folder } => {
                write!(
                    f,
                    "Template '{}' is not found (missing folder '{}').",
                    template, folder
                )
            }
            ProvisionError::AuthFailure(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            ProvisionError::ValidationError(msg) => {
                write!(f, "Validation error: {}", msg)
            }
            ProvisionError::ProvisioningFailure(msg) => {
                write!(f, "Provisioning failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProvisionError {}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::CatalogInvalid(err.to_string())
    }
}
