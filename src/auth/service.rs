//! AuthService seam: the identity client used by the federated branch and
//! the profile/organization lookups that follow a successful sign-in.

use crate::messenger::Messenger;
use anyhow::Result;
use std::fmt;

/// How the access token is presented to the DevOps service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Basic,
}

/// Access token or PAT. Never printed; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretToken(***)")
    }
}

/// Normalized outcome of either authentication branch
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResult {
    pub access_token: SecretToken,
    pub organization_name: String,
    pub scheme: AuthScheme,
}

/// An account remembered by a login client
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
}

/// Token handed out by a login client
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: SecretToken,
    pub account: Account,
}

/// Silent acquisition either needs the user back, or failed for good
#[derive(Debug)]
pub enum TokenError {
    /// Cached credentials are expired or revoked; sign in interactively
    InteractionRequired(String),
    Failed(anyhow::Error),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::InteractionRequired(reason) => {
                write!(f, "Interactive sign-in required: {}", reason)
            }
            TokenError::Failed(err) => write!(f, "Token acquisition failed: {:#}", err),
        }
    }
}

impl std::error::Error for TokenError {}

/// Interactive-login client context, built once per federated attempt
pub trait LoginClient {
    /// Accounts already signed in through this client
    fn accounts(&self) -> Vec<Account>;

    /// Obtain a token without user interaction
    fn acquire_token_silent(&self, account: &Account, force_refresh: bool) -> Result<TokenGrant, TokenError>;

    /// Run the interactive sign-in challenge
    fn acquire_token_interactive(&self, msg: &Messenger<'_>) -> Result<TokenGrant>;
}

/// Identity capability used by the federated branch
pub trait AuthService: Send + Sync {
    fn login_client(&self) -> Result<Box<dyn LoginClient>>;

    /// Member id of the signed-in identity
    fn get_profile(&self, token: &SecretToken) -> Result<String>;

    /// Names of the organizations the member belongs to
    fn get_organizations(&self, token: &SecretToken, member_id: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_token_debug_is_redacted() {
        let result = AuthResult {
            access_token: SecretToken::new("abc123"),
            organization_name: "contoso".to_string(),
            scheme: AuthScheme::Basic,
        };

        let rendered = format!("{:?}", result);
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("contoso"));
    }

    #[test]
    fn test_blank_token() {
        assert!(SecretToken::new("  ").is_blank());
        assert!(!SecretToken::new("x").is_blank());
    }
}
