//! Test doubles for the identity and project services, and a ready-made
//! template source for driving whole provisioning sessions.

#![cfg(test)]

use crate::auth::service::{Account, LoginClient, TokenError, TokenGrant};
use crate::auth::{AuthService, SecretToken};
use crate::config::Settings;
use crate::context::Context;
use crate::messenger::Messenger;
use crate::provisioning::{ProjectService, ProvisioningRequest};
use crate::traits::{MockFileSystem, MockOutput, MockResponse, MockUserInput};
use anyhow::Result;
use std::sync::{Arc, Mutex};

/// Template source with three entries:
/// 1. `Scrum` (folder present, no extensions)
/// 2. `Kanban` (folder missing)
/// 3. `Timeline Demo` (folder present, one extension)
pub fn sample_templates() -> MockFileSystem {
    MockFileSystem::new()
        .with_file(
            "Templates/TemplateSetting.json",
            r#"{
                "GroupwiseTemplates": [
                    {
                        "Groups": "Agile",
                        "Template": [
                            { "Name": "Scrum", "TemplateFolder": "scrum-template" },
                            { "Name": "Kanban", "TemplateFolder": "kanban-template" }
                        ]
                    },
                    {
                        "Groups": "DevOps Labs",
                        "Template": [
                            { "Name": "Timeline Demo", "TemplateFolder": "timeline-template", "ConfirmExtension": true }
                        ]
                    }
                ]
            }"#,
        )
        .with_dir("Templates/scrum-template")
        .with_file(
            "Templates/timeline-template/Extensions.json",
            r#"{
                "Extensions": [
                    {
                        "extensionName": "Delivery Plans",
                        "link": "<a href='https://marketplace.visualstudio.com/items?itemName=ms.vss-plans' target='_blank'>Delivery Plans</a>",
                        "License": "<a href='https://marketplace.visualstudio.com/items/ms.vss-plans/license' target='_blank'>License Terms</a>",
                        "PublisherID": "ms",
                        "ExtensionID": "vss-plans"
                    }
                ]
            }"#,
        )
}

#[derive(Debug, Clone, Default)]
struct AuthScript {
    cached_account: bool,
    silent_token: Option<String>,
    interactive_token: Option<String>,
    organizations: Vec<String>,
}

/// Scripted [`AuthService`]. By default there is no cached account, silent
/// acquisition needs interaction and interactive sign-in fails.
pub struct MockAuthService {
    script: AuthScript,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self {
            script: AuthScript::default(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_cached_account(mut self) -> Self {
        self.script.cached_account = true;
        self
    }

    pub fn with_silent_token(mut self, token: &str) -> Self {
        self.script.silent_token = Some(token.to_string());
        self
    }

    pub fn with_interactive_token(mut self, token: &str) -> Self {
        self.script.interactive_token = Some(token.to_string());
        self
    }

    pub fn with_organizations(mut self, organizations: &[&str]) -> Self {
        self.script.organizations = organizations.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Every call made, in order, including those on login clients
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl AuthService for MockAuthService {
    fn login_client(&self) -> Result<Box<dyn LoginClient>> {
        self.record("login_client");
        Ok(Box::new(MockLoginClient {
            script: self.script.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }

    fn get_profile(&self, _token: &SecretToken) -> Result<String> {
        self.record("profile");
        Ok("member-1".to_string())
    }

    fn get_organizations(&self, _token: &SecretToken, _member_id: &str) -> Result<Vec<String>> {
        self.record("organizations");
        Ok(self.script.organizations.clone())
    }
}

struct MockLoginClient {
    script: AuthScript,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockLoginClient {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl LoginClient for MockLoginClient {
    fn accounts(&self) -> Vec<Account> {
        if self.script.cached_account {
            vec![Account {
                id: "cached-account".to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    fn acquire_token_silent(&self, account: &Account, force_refresh: bool) -> Result<TokenGrant, TokenError> {
        self.record(if force_refresh { "silent(force)" } else { "silent" });
        match &self.script.silent_token {
            Some(token) => Ok(TokenGrant {
                access_token: SecretToken::new(token.as_str()),
                account: account.clone(),
            }),
            None => Err(TokenError::InteractionRequired("refresh token expired".to_string())),
        }
    }

    fn acquire_token_interactive(&self, _msg: &Messenger<'_>) -> Result<TokenGrant> {
        self.record("interactive");
        match &self.script.interactive_token {
            Some(token) => Ok(TokenGrant {
                access_token: SecretToken::new(token.as_str()),
                account: Account {
                    id: "interactive-account".to_string(),
                },
            }),
            None => anyhow::bail!("Device sign-in was declined by the user"),
        }
    }
}

/// Records every request and answers with a fixed outcome
pub struct MockProjectService {
    outcome: Result<bool, String>,
    requests: Mutex<Vec<ProvisioningRequest>>,
}

impl MockProjectService {
    fn with_outcome(outcome: Result<bool, String>) -> Self {
        Self {
            outcome,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(true))
    }

    pub fn failing() -> Self {
        Self::with_outcome(Ok(false))
    }

    /// The service cannot be reached at all
    pub fn erroring(message: &str) -> Self {
        Self::with_outcome(Err(message.to_string()))
    }

    pub fn requests(&self) -> Vec<ProvisioningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ProjectService for MockProjectService {
    fn create_environment(&self, request: ProvisioningRequest) -> Result<bool> {
        self.requests.lock().unwrap().push(request);
        self.outcome.clone().map_err(anyhow::Error::msg)
    }
}

/// A [`Context`] wired to mocks, with typed handles kept for assertions
pub struct TestContext {
    pub ctx: Context,
    pub input: Arc<MockUserInput>,
    pub output: Arc<MockOutput>,
    pub auth: Arc<MockAuthService>,
    pub projects: Arc<MockProjectService>,
}

impl TestContext {
    /// Default settings, a failing sign-in and a succeeding project service
    pub fn new(fs: MockFileSystem, responses: Vec<MockResponse>) -> Self {
        Self::with_services(fs, responses, MockAuthService::new(), MockProjectService::succeeding())
    }

    pub fn with_services(
        fs: MockFileSystem,
        responses: Vec<MockResponse>,
        auth: MockAuthService,
        projects: MockProjectService,
    ) -> Self {
        let input = Arc::new(MockUserInput::with_responses(responses));
        let output = Arc::new(MockOutput::new());
        let auth = Arc::new(auth);
        let projects = Arc::new(projects);

        let ctx = Context::test_with(
            Arc::new(fs),
            input.clone(),
            output.clone(),
            auth.clone(),
            projects.clone(),
            Settings::default(),
        );

        Self {
            ctx,
            input,
            output,
            auth,
            projects,
        }
    }
}
