//! Environment creation against the Azure DevOps REST API.

use super::request::ProvisioningRequest;
use crate::auth::AuthScheme;
use crate::config::DevOpsSettings;
use crate::error::ProvisionError;
use crate::messenger::Messenger;
use crate::traits::{Credentials, FileSystem, HttpClient, Output};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Optional per-template file naming the process template to use
pub const PROJECT_SETTINGS_FILE: &str = "ProjectSettings.json";

const EXTENSION_API_VERSION: &str = "7.1-preview.1";

/// Creates the project environment described by a request
pub trait ProjectService: Send + Sync {
    /// `Ok(false)` when the service refused or failed the request; `Err`
    /// only when it could not be reached at all.
    fn create_environment(&self, request: ProvisioningRequest) -> Result<bool>;
}

#[derive(Debug, Default, Deserialize)]
struct ProjectSettings {
    #[serde(rename = "type", default)]
    process: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessList {
    #[serde(default)]
    value: Vec<Process>,
}

#[derive(Debug, Deserialize)]
struct Process {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct OperationReference {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    status: String,
    #[serde(default)]
    result_message: Option<String>,
}

/// Azure DevOps implementation of [`ProjectService`]
pub struct AzureDevOpsProjectService {
    settings: DevOpsSettings,
    templates_dir: PathBuf,
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystem>,
    output: Arc<dyn Output>,
}

impl AzureDevOpsProjectService {
    pub fn new(
        settings: DevOpsSettings,
        templates_dir: PathBuf,
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystem>,
        output: Arc<dyn Output>,
    ) -> Self {
        Self {
            settings,
            templates_dir,
            http,
            fs,
            output,
        }
    }

    fn org_url(&self, organization: &str, path: &str) -> String {
        format!(
            "{}/{}/_apis/{}?api-version={}",
            self.settings.base_url.trim_end_matches('/'),
            organization,
            path,
            self.settings.api_version
        )
    }

    fn project_settings(&self, template_folder: &str) -> Result<ProjectSettings> {
        let path = self.templates_dir.join(template_folder).join(PROJECT_SETTINGS_FILE);
        if !self.fs.is_file(&path) {
            return Ok(ProjectSettings::default());
        }
        let content = self.fs.read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn find_process(
        &self,
        msg: &Messenger<'_>,
        request: &ProvisioningRequest,
        credentials: Credentials<'_>,
        process_name: &str,
    ) -> Result<Option<String>> {
        let response = self.http.get(
            &self.org_url(&request.organization_name, "process/processes"),
            credentials,
        )?;
        if !response.is_success() {
            reject(msg, &describe_status(response.status, request));
            return Ok(None);
        }

        let processes: ProcessList = match response.json() {
            Ok(list) => list,
            Err(_) => {
                reject(msg, &describe_status(response.status, request));
                return Ok(None);
            }
        };

        match processes
            .value
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(process_name))
        {
            Some(process) => Ok(Some(process.id)),
            None => {
                reject(
                    msg,
                    &format!(
                        "Process template '{}' is not available in organization '{}'.",
                        process_name, request.organization_name
                    ),
                );
                Ok(None)
            }
        }
    }

    fn queue_project(
        &self,
        msg: &Messenger<'_>,
        request: &ProvisioningRequest,
        credentials: Credentials<'_>,
        process_id: &str,
        description: &str,
    ) -> Result<Option<String>> {
        let body = json!({
            "name": request.project_name,
            "description": description,
            "capabilities": {
                "versioncontrol": { "sourceControlType": "Git" },
                "processTemplate": { "templateTypeId": process_id }
            }
        });

        let response = self.http.post_json(
            &self.org_url(&request.organization_name, "projects"),
            credentials,
            &body,
        )?;

        match response.status {
            409 => {
                reject(
                    msg,
                    &format!(
                        "A project named '{}' already exists in '{}'.",
                        request.project_name, request.organization_name
                    ),
                );
                Ok(None)
            }
            _ if !response.is_success() => {
                reject(msg, &describe_status(response.status, request));
                Ok(None)
            }
            _ => match response.json::<OperationReference>() {
                Ok(operation) => Ok(Some(operation.url)),
                Err(_) => {
                    reject(msg, &describe_status(response.status, request));
                    Ok(None)
                }
            },
        }
    }

    fn wait_for_operation(
        &self,
        msg: &Messenger<'_>,
        operation_url: &str,
        credentials: Credentials<'_>,
    ) -> Result<bool> {
        let interval = Duration::from_secs(self.settings.poll_interval_secs);
        for _ in 0..self.settings.max_poll_attempts {
            let response = self.http.get(operation_url, credentials)?;
            if !response.is_success() {
                reject(msg, &format!("Could not read project creation status (HTTP {}).", response.status));
                return Ok(false);
            }

            let operation: Operation = match response.json() {
                Ok(operation) => operation,
                Err(e) => {
                    reject(msg, &format!("Could not read project creation status: {}", e));
                    return Ok(false);
                }
            };
            match operation.status.as_str() {
                "succeeded" => return Ok(true),
                "failed" | "cancelled" => {
                    let detail = operation
                        .result_message
                        .unwrap_or_else(|| format!("operation {}", operation.status));
                    reject(msg, &detail);
                    return Ok(false);
                }
                _ => std::thread::sleep(interval),
            }
        }

        reject(msg, "Timed out waiting for the project to be created.");
        Ok(false)
    }

    fn install_extensions(&self, msg: &Messenger<'_>, request: &ProvisioningRequest, credentials: Credentials<'_>) -> Result<()> {
        for extension in &request.extensions {
            let Some((publisher, extension_id)) = extension.marketplace_id() else {
                msg.warning(&format!(
                    "Extension '{}' has no marketplace id; install it manually.",
                    extension.name
                ));
                continue;
            };

            let url = format!(
                "{}/{}/_apis/extensionmanagement/installedextensionsbyname/{}/{}?api-version={}",
                self.settings.extensions_url.trim_end_matches('/'),
                request.organization_name,
                publisher,
                extension_id,
                EXTENSION_API_VERSION
            );
            let response = match self.http.post_json(&url, credentials, &json!({})) {
                Ok(response) => response,
                Err(e) => {
                    msg.warning(&format!("Could not install extension '{}': {:#}", extension.name, e));
                    continue;
                }
            };
            match response.status {
                409 => msg.dimmed(&format!("Extension '{}' is already installed.", extension.name)),
                _ if response.is_success() => msg.success(&format!("Installed extension '{}'.", extension.name)),
                status => msg.warning(&format!(
                    "Could not install extension '{}' (HTTP {}).",
                    extension.name, status
                )),
            }
        }
        Ok(())
    }
}

impl ProjectService for AzureDevOpsProjectService {
    fn create_environment(&self, request: ProvisioningRequest) -> Result<bool> {
        let msg = Messenger::new(&request.session_id, &*self.output);
        let credentials = match request.auth_scheme {
            AuthScheme::Bearer => Credentials::Bearer(request.access_token.expose()),
            AuthScheme::Basic => Credentials::Basic(request.access_token.expose()),
        };

        let project_settings = self.project_settings(&request.template_folder)?;
        let process_name = project_settings
            .process
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_process.clone());
        let description = project_settings
            .description
            .unwrap_or_else(|| format!("Demo project created from the '{}' template", request.template_name));

        msg.dimmed(&format!("Using process template '{}'.", process_name));
        let Some(process_id) = self.find_process(&msg, &request, credentials, &process_name)? else {
            return Ok(false);
        };

        let Some(operation_url) = self.queue_project(&msg, &request, credentials, &process_id, &description)? else {
            return Ok(false);
        };

        msg.dimmed("Waiting for the project to be created...");
        if !self.wait_for_operation(&msg, &operation_url, credentials)? {
            return Ok(false);
        }

        if request.consent_granted {
            self.install_extensions(&msg, &request, credentials)?;
        } else if request.extensions_present {
            msg.warning("Extensions were not confirmed; the template may need them installed manually.");
        }

        Ok(true)
    }
}

fn reject(msg: &Messenger<'_>, reason: &str) {
    msg.error(&ProvisionError::ProvisioningFailure(reason.to_string()).to_string());
}

fn describe_status(status: u16, request: &ProvisioningRequest) -> String {
    match status {
        // A rejected PAT is answered with a sign-in page and 203
        401 | 203 => format!(
            "Access to organization '{}' was denied; check the token and its scopes.",
            request.organization_name
        ),
        403 => "The account is not allowed to create projects.".to_string(),
        404 => format!("Organization '{}' was not found.", request.organization_name),
        status => format!("The service answered with HTTP {}.", status),
    }
}
