use crate::auth::{AuthResult, AuthScheme, SecretToken};
use crate::error::ProvisionError;
use crate::messenger::SessionId;
use crate::template::{ExtensionConsent, ExtensionEntry, ResolvedTemplate};

/// Everything the environment-creation service needs for one project
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningRequest {
    pub session_id: SessionId,
    pub access_token: SecretToken,
    pub organization_name: String,
    pub project_name: String,
    pub template_name: String,
    pub template_folder: String,
    pub extensions: Vec<ExtensionEntry>,
    /// The template ships an extension manifest with entries
    pub extensions_present: bool,
    /// The user agreed to install them and to their licenses
    pub consent_granted: bool,
    pub auth_scheme: AuthScheme,
}

impl ProvisioningRequest {
    /// Build the request, refusing it unless organization, token and
    /// project name are all present.
    pub fn assemble(
        session_id: &SessionId,
        auth: Option<AuthResult>,
        project_name: &str,
        template: &ResolvedTemplate,
        consent: ExtensionConsent,
    ) -> Result<Self, ProvisionError> {
        let auth = auth.ok_or_else(|| missing("credentials"))?;
        if auth.organization_name.trim().is_empty() {
            return Err(missing("organization name"));
        }
        if auth.access_token.is_blank() {
            return Err(missing("access token"));
        }
        if project_name.trim().is_empty() {
            return Err(missing("project name"));
        }

        let extensions_present = consent.extensions_present();
        Ok(Self {
            session_id: session_id.clone(),
            access_token: auth.access_token,
            organization_name: auth.organization_name.trim().to_string(),
            project_name: project_name.trim().to_string(),
            template_name: template.name.clone(),
            template_folder: template.folder.clone(),
            extensions: consent.extensions,
            extensions_present,
            consent_granted: consent.consent_granted,
            auth_scheme: auth.scheme,
        })
    }
}

fn missing(field: &str) -> ProvisionError {
    ProvisionError::ValidationError(format!("{} must be provided", field))
}
