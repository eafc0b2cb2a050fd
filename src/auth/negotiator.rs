use super::service::{AuthResult, AuthScheme, AuthService, SecretToken, TokenError};
use crate::error::ProvisionError;
use crate::messenger::Messenger;
use crate::traits::UserInput;
use crate::validation::is_absolute_url;
use anyhow::Result;

/// The two ways a user can authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthBranch {
    /// Interactive sign-in yielding a bearer token
    Federated,
    /// Organization name plus personal access token
    StaticCredential,
}

impl AuthBranch {
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(AuthBranch::Federated),
            "2" => Some(AuthBranch::StaticCredential),
            _ => None,
        }
    }
}

/// Result of one negotiation attempt
#[derive(Debug, PartialEq)]
pub enum AuthOutcome {
    Authenticated(AuthResult),
    /// Input was refused; the caller restarts its loop
    Rejected,
    /// No branch was chosen, so no credentials exist
    NoBranch,
}

/// Runs the branch the user picks and normalizes its result.
///
/// Errors returned from here come from the federated branch (or from the
/// terminal itself) and are not retryable.
pub struct AuthNegotiator<'a> {
    input: &'a dyn UserInput,
    auth: &'a dyn AuthService,
}

impl<'a> AuthNegotiator<'a> {
    pub fn new(input: &'a dyn UserInput, auth: &'a dyn AuthService) -> Self {
        Self { input, auth }
    }

    pub fn negotiate(&self, msg: &Messenger<'_>) -> Result<AuthOutcome> {
        msg.info("Choose authentication method: 1. Device Login using AD auth 2. Personal Access Token (PAT)");
        let choice = self.input.text("Authentication method (1 or 2):")?;

        match AuthBranch::from_choice(&choice) {
            Some(AuthBranch::Federated) => Ok(AuthOutcome::Authenticated(self.federated(msg)?)),
            Some(AuthBranch::StaticCredential) => self.static_credential(msg),
            None => {
                msg.warning(&format!("Unrecognized authentication method '{}'.", choice.trim()));
                Ok(AuthOutcome::NoBranch)
            }
        }
    }

    fn federated(&self, msg: &Messenger<'_>) -> Result<AuthResult> {
        let client = self.auth.login_client()?;

        let grant = match client.accounts().into_iter().next() {
            Some(account) => match client.acquire_token_silent(&account, true) {
                Ok(grant) => grant,
                Err(TokenError::InteractionRequired(reason)) => {
                    msg.dimmed(&format!("Cached sign-in is no longer valid ({}).", reason));
                    client.acquire_token_interactive(msg)?
                }
                Err(TokenError::Failed(err)) => return Err(err),
            },
            None => client.acquire_token_interactive(msg)?,
        };

        let member_id = self.auth.get_profile(&grant.access_token)?;
        let organizations = self.auth.get_organizations(&grant.access_token, &member_id)?;
        let organization_name = self.select_organization(organizations)?;

        Ok(AuthResult {
            access_token: grant.access_token,
            organization_name,
            scheme: AuthScheme::Bearer,
        })
    }

    fn select_organization(&self, mut organizations: Vec<String>) -> Result<String> {
        organizations.retain(|org| !org.trim().is_empty());
        if organizations.is_empty() {
            return Err(ProvisionError::AuthFailure(
                "No organizations found for the signed-in account.".to_string(),
            )
            .into());
        }
        organizations.sort_by_key(|org| org.to_lowercase());
        self.input.select("Select an organization:", organizations)
    }

    fn static_credential(&self, msg: &Messenger<'_>) -> Result<AuthOutcome> {
        let organization_name = self.input.text("Enter your Azure DevOps organization name:")?;
        let organization_name = organization_name.trim();
        if organization_name.is_empty() {
            msg.error("Organization name cannot be empty.");
            return Ok(AuthOutcome::Rejected);
        }

        if is_absolute_url(organization_name) {
            msg.error(
                "Please enter only the last part of the Azure DevOps URL (e.g., {ORGANIZATION_NAME} from https://dev.azure.com/{ORGANIZATION_NAME}).",
            );
            return Ok(AuthOutcome::Rejected);
        }

        let token = SecretToken::new(
            self.input
                .password("Enter your Azure DevOps personal access token:")?
                .trim(),
        );
        if token.is_blank() {
            msg.error("Personal access token cannot be empty.");
            return Ok(AuthOutcome::Rejected);
        }

        Ok(AuthOutcome::Authenticated(AuthResult {
            access_token: token,
            organization_name: organization_name.to_string(),
            scheme: AuthScheme::Basic,
        }))
    }
}
