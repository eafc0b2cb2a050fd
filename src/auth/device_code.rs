//! Device-code sign-in against the Microsoft identity platform, plus the
//! profile and account lookups of the Azure DevOps identity service.

use super::service::{Account, AuthService, LoginClient, SecretToken, TokenError, TokenGrant};
use crate::config::AuthSettings;
use crate::messenger::Messenger;
use crate::traits::{Credentials, HttpClient};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const ACCOUNTS_API_VERSION: &str = "7.1";
const SLOW_DOWN_STEP_SECS: u64 = 5;
// Refresh a little before the server-side expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default = "default_device_code_lifetime")]
    expires_in: u64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

fn default_device_code_lifetime() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AccountList {
    #[serde(default)]
    value: Vec<DevOpsAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevOpsAccount {
    account_name: String,
}

struct CachedAccount {
    account: Account,
    access_token: SecretToken,
    refresh_token: Option<SecretToken>,
    expires_at: DateTime<Utc>,
}

/// Accounts signed in during this process. Lives in memory only.
#[derive(Default)]
struct TokenCache {
    entry: Option<CachedAccount>,
}

impl TokenCache {
    fn remember(&mut self, account: Account, token: TokenResponse) -> TokenGrant {
        let access_token = SecretToken::new(token.access_token);
        let previous_refresh = self.entry.take().and_then(|e| e.refresh_token);
        self.entry = Some(CachedAccount {
            account: account.clone(),
            access_token: access_token.clone(),
            refresh_token: token.refresh_token.map(SecretToken::new).or(previous_refresh),
            expires_at: expiry_from(token.expires_in),
        });
        TokenGrant {
            access_token,
            account,
        }
    }
}

/// Out-of-range lifetimes count as already expired
fn expiry_from(expires_in: i64) -> DateTime<Utc> {
    let now = Utc::now();
    TimeDelta::try_seconds(expires_in.saturating_sub(EXPIRY_MARGIN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(now)
}

/// Federated sign-in through the OAuth 2.0 device authorization grant
pub struct DeviceCodeAuthService {
    settings: AuthSettings,
    http: Arc<dyn HttpClient>,
    cache: Arc<Mutex<TokenCache>>,
}

impl DeviceCodeAuthService {
    pub fn new(settings: AuthSettings, http: Arc<dyn HttpClient>) -> Self {
        Self {
            settings,
            http,
            cache: Arc::new(Mutex::new(TokenCache::default())),
        }
    }
}

impl AuthService for DeviceCodeAuthService {
    fn login_client(&self) -> Result<Box<dyn LoginClient>> {
        if self.settings.client_id.trim().is_empty() {
            bail!("No client id configured for interactive sign-in");
        }
        Ok(Box::new(PublicClient {
            settings: self.settings.clone(),
            http: Arc::clone(&self.http),
            cache: Arc::clone(&self.cache),
        }))
    }

    fn get_profile(&self, token: &SecretToken) -> Result<String> {
        let response = self
            .http
            .get(&self.settings.profile_url, Credentials::Bearer(token.expose()))?;
        if !response.is_success() {
            bail!("Failed to fetch profile (HTTP {})", response.status);
        }
        let profile: Profile = response.json().context("Failed to read profile")?;
        Ok(profile.id)
    }

    fn get_organizations(&self, token: &SecretToken, member_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}?memberId={}&api-version={}",
            self.settings.accounts_url, member_id, ACCOUNTS_API_VERSION
        );
        let response = self.http.get(&url, Credentials::Bearer(token.expose()))?;
        if !response.is_success() {
            bail!("Failed to list organizations (HTTP {})", response.status);
        }
        let accounts: AccountList = response.json().context("Failed to read organizations")?;
        Ok(accounts.value.into_iter().map(|a| a.account_name).collect())
    }
}

/// Login client context sharing the service's account cache
struct PublicClient {
    settings: AuthSettings,
    http: Arc<dyn HttpClient>,
    cache: Arc<Mutex<TokenCache>>,
}

impl PublicClient {
    fn endpoint(&self, name: &str) -> String {
        format!("{}/oauth2/v2.0/{}", self.settings.authority.trim_end_matches('/'), name)
    }

    fn scope(&self) -> String {
        self.settings.scopes.join(" ")
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, TokenCache>> {
        self.cache
            .lock()
            .map_err(|_| anyhow::anyhow!("Token cache lock poisoned"))
    }
}

impl LoginClient for PublicClient {
    fn accounts(&self) -> Vec<Account> {
        match self.cache.lock() {
            Ok(cache) => cache.entry.iter().map(|e| e.account.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn acquire_token_silent(&self, account: &Account, force_refresh: bool) -> Result<TokenGrant, TokenError> {
        let mut cache = self.lock_cache().map_err(TokenError::Failed)?;
        let entry = cache
            .entry
            .as_ref()
            .filter(|e| e.account == *account)
            .ok_or_else(|| TokenError::InteractionRequired("account is not signed in".to_string()))?;

        if !force_refresh && entry.expires_at > Utc::now() {
            return Ok(TokenGrant {
                access_token: entry.access_token.clone(),
                account: entry.account.clone(),
            });
        }

        let refresh_token = entry
            .refresh_token
            .clone()
            .ok_or_else(|| TokenError::InteractionRequired("no refresh token cached".to_string()))?;

        let scope = self.scope();
        let response = self
            .http
            .post_form(
                &self.endpoint("token"),
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", self.settings.client_id.as_str()),
                    ("refresh_token", refresh_token.expose()),
                    ("scope", scope.as_str()),
                ],
            )
            .map_err(TokenError::Failed)?;

        if response.is_success() {
            let token: TokenResponse = response.json().map_err(TokenError::Failed)?;
            return Ok(cache.remember(account.clone(), token));
        }

        let error: OAuthError = response.json().map_err(TokenError::Failed)?;
        match error.error.as_str() {
            "invalid_grant" | "interaction_required" | "login_required" | "consent_required" => {
                cache.entry = None;
                Err(TokenError::InteractionRequired(error.to_string()))
            }
            _ => Err(TokenError::Failed(anyhow::anyhow!("{}", error))),
        }
    }

    fn acquire_token_interactive(&self, msg: &Messenger<'_>) -> Result<TokenGrant> {
        let scope = self.scope();
        let response = self.http.post_form(
            &self.endpoint("devicecode"),
            &[("client_id", self.settings.client_id.as_str()), ("scope", scope.as_str())],
        )?;
        if !response.is_success() {
            let error: OAuthError = response.json()?;
            bail!("Device code request failed: {}", error);
        }
        let device: DeviceCodeResponse = response.json().context("Failed to read device code")?;

        match &device.message {
            Some(message) => msg.info(message),
            None => msg.info(&format!(
                "To sign in, open {} and enter the code {}",
                device.verification_uri, device.user_code
            )),
        }

        let deadline = Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = Duration::from_secs(device.interval);
        loop {
            if Instant::now() >= deadline {
                bail!("The device code expired before sign-in completed");
            }
            std::thread::sleep(interval);

            let response = self.http.post_form(
                &self.endpoint("token"),
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.settings.client_id.as_str()),
                    ("device_code", device.device_code.as_str()),
                ],
            )?;

            if response.is_success() {
                let token: TokenResponse = response.json().context("Failed to read token")?;
                let account = Account {
                    id: Uuid::new_v4().to_string(),
                };
                let grant = self.lock_cache()?.remember(account, token);
                msg.success("Signed in.");
                return Ok(grant);
            }

            let error: OAuthError = response.json()?;
            match error.error.as_str() {
                "authorization_pending" => {}
                "slow_down" => interval += Duration::from_secs(SLOW_DOWN_STEP_SECS),
                "authorization_declined" => bail!("Sign-in was declined"),
                "expired_token" => bail!("The device code expired before sign-in completed"),
                _ => bail!("Sign-in failed: {}", error),
            }
        }
    }
}
