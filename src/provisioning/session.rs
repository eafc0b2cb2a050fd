use super::request::ProvisioningRequest;
use crate::auth::{AuthNegotiator, AuthOutcome, AuthResult};
use crate::context::Context;
use crate::error::ProvisionError;
use crate::messenger::{Messenger, SessionId};
use crate::template::{ExtensionAdvisor, ExtensionConsent, ResolvedTemplate, TemplateCatalog};
use crate::validation::{check_project_name, is_affirmative, validate_project_name};
use anyhow::Result;
use std::process::ExitCode;

/// How the process ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::Failure => ExitCode::FAILURE,
        }
    }
}

/// Where a step sends the iteration next
enum Flow<T> {
    Proceed(T),
    /// Start over from template selection
    Restart,
    Stop(Exit),
}

macro_rules! proceed {
    ($flow:expr) => {
        match $flow {
            Flow::Proceed(value) => value,
            Flow::Restart => return Ok(None),
            Flow::Stop(exit) => return Ok(Some(exit)),
        }
    };
}

/// Top-level loop: template, extensions, credentials, project name,
/// dispatch, then ask whether to go again.
pub struct ProvisioningSession<'a> {
    ctx: &'a Context,
}

impl<'a> ProvisioningSession<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Run iterations until one of them decides how the process exits.
    /// Errors are fatal and map to a failure exit in `main`.
    pub fn run(&self) -> Result<Exit> {
        loop {
            let id = SessionId::generate();
            if let Some(exit) = self.run_iteration(&id)? {
                return Ok(exit);
            }
        }
    }

    /// One pass through the state machine; `None` means loop again
    pub fn run_iteration(&self, id: &SessionId) -> Result<Option<Exit>> {
        let msg = Messenger::new(id, &*self.ctx.output);

        // Step 1: pick and resolve a template
        let template = proceed!(self.select_template(&msg)?);

        // Step 2: extensions the template needs, and the user's consent
        let consent = self.confirm_extensions(&msg, &template)?;

        // Step 3: credentials
        let auth = proceed!(self.authenticate(&msg)?);

        // Step 4: project name
        let project_name = proceed!(self.name_project(&msg)?);

        // Step 5: build the request and hand it over
        let request = match ProvisioningRequest::assemble(id, auth, &project_name, &template, consent) {
            Ok(request) => request,
            Err(e) => {
                msg.dimmed(&e.to_string());
                msg.error("Validation error: All inputs must be provided. Exiting..");
                return Ok(Some(Exit::Failure));
            }
        };
        if let Some(exit) = self.dispatch(&msg, request) {
            return Ok(Some(exit));
        }

        // Step 6: go again?
        self.ask_repeat(&msg)
    }

    fn select_template(&self, msg: &Messenger<'_>) -> Result<Flow<ResolvedTemplate>> {
        msg.output().section("Template Details");
        let catalog = TemplateCatalog::load(&*self.ctx.fs, &self.ctx.settings.templates_dir)?;

        let output = msg.output();
        let mut current_group: Option<String> = None;
        for entry in catalog.list_selectable() {
            if current_group.as_deref() != Some(entry.group.as_str()) {
                output.subsection(&entry.group);
                current_group = Some(entry.group.clone());
            }
            output.list_item(entry.index, &entry.name);
        }

        let choice = self
            .ctx
            .input
            .text("Enter the template number from the list of templates above:")?;
        let Some(name) = choice
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| catalog.name_at(n))
        else {
            msg.warning("Invalid template number entered.");
            return Ok(Flow::Restart);
        };

        match catalog.resolve(&name) {
            Ok(template) => {
                msg.info(&format!("Selected template: {}", template.name));
                output.key_value("Folder", &template.path.display().to_string());
                if let Some(description) = &template.description {
                    output.key_value("Description", description);
                }
                Ok(Flow::Proceed(template))
            }
            Err(e @ (ProvisionError::TemplateNotFound(_) | ProvisionError::FolderMissing { .. })) => {
                msg.error(&e.to_string());
                let exit = self.retry_or_exit(
                    msg,
                    "Would you like to try again or exit? (type 'retry' to try again or 'exit' to quit):",
                    Exit::Success,
                )?;
                Ok(exit.map_or(Flow::Restart, Flow::Stop))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn confirm_extensions(&self, msg: &Messenger<'_>, template: &ResolvedTemplate) -> Result<ExtensionConsent> {
        let advisor = ExtensionAdvisor::new(&*self.ctx.fs, &*self.ctx.input, &self.ctx.settings.templates_dir);
        let consent = advisor.review(msg, &template.folder)?;

        if template.requires_confirmation && !consent.extensions_present() {
            msg.warning(&format!(
                "Template '{}' asks for extension confirmation but lists no extensions.",
                template.name
            ));
        }
        Ok(consent)
    }

    fn authenticate(&self, msg: &Messenger<'_>) -> Result<Flow<Option<AuthResult>>> {
        let negotiator = AuthNegotiator::new(&*self.ctx.input, &*self.ctx.auth);
        match negotiator.negotiate(msg) {
            Ok(AuthOutcome::Authenticated(result)) => Ok(Flow::Proceed(Some(result))),
            Ok(AuthOutcome::Rejected) => Ok(Flow::Restart),
            // Carried on so the pre-dispatch check can end the run
            Ok(AuthOutcome::NoBranch) => Ok(Flow::Proceed(None)),
            Err(e) => {
                msg.error(&format!("Error: {:#}", e));
                msg.info("Exiting the application.");
                Ok(Flow::Stop(Exit::Failure))
            }
        }
    }

    fn name_project(&self, msg: &Messenger<'_>) -> Result<Flow<String>> {
        loop {
            let name = self.ctx.input.text("Enter the new project name:")?;
            let name = name.trim();
            if name.is_empty() {
                msg.error("Project name cannot be empty.");
                continue;
            }

            if !check_project_name(name) {
                msg.error("Validation error: Project name is not valid.");
                msg.dimmed(&validate_project_name(name).err().unwrap_or_default());
                let exit = self.retry_or_exit(
                    msg,
                    "Do you want to try with a valid project name or exit? (type 'retry' to try again or 'exit' to quit):",
                    Exit::Failure,
                )?;
                if let Some(exit) = exit {
                    return Ok(Flow::Stop(exit));
                }
                continue;
            }

            return Ok(Flow::Proceed(name.to_string()));
        }
    }

    /// `Some` only when the service failed outright
    fn dispatch(&self, msg: &Messenger<'_>, request: ProvisioningRequest) -> Option<Exit> {
        msg.info(&format!(
            "Creating project '{}' in organization '{}' using template from '{}'...",
            request.project_name, request.organization_name, request.template_name
        ));

        match self.ctx.projects.create_environment(request) {
            Ok(true) => {
                msg.success("Project created successfully.");
                None
            }
            Ok(false) => {
                msg.error("Project creation failed.");
                None
            }
            Err(e) => {
                msg.error(&format!("An error occurred while creating the project: {:#}", e));
                msg.info("Exiting the application.");
                Some(Exit::Failure)
            }
        }
    }

    fn ask_repeat(&self, msg: &Messenger<'_>) -> Result<Option<Exit>> {
        let answer = self
            .ctx
            .input
            .text("Do you want to create another project? (yes/no): press enter to confirm")?;
        msg.output().blank();

        if is_affirmative(&answer) {
            return Ok(None);
        }
        msg.info("Exiting the application.");
        Ok(Some(Exit::Success))
    }

    /// Ask to retry or quit. `exit` is returned when the user types
    /// "exit"; any other answer means retry.
    fn retry_or_exit(&self, msg: &Messenger<'_>, prompt: &str, exit: Exit) -> Result<Option<Exit>> {
        let answer = self.ctx.input.text(prompt)?;
        if answer.trim().eq_ignore_ascii_case("exit") {
            msg.info("Exiting the application.");
            return Ok(Some(exit));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockAuthService, MockProjectService, TestContext, sample_templates};
    use crate::traits::output::OutputMessage;
    use crate::traits::{MockFileSystem, MockResponse};

    fn lines(items: &[&str]) -> Vec<MockResponse> {
        items.iter().map(|s| MockResponse::Text(s.to_string())).collect()
    }

    fn pat_login(org: &str, token: &str) -> Vec<MockResponse> {
        vec![
            MockResponse::Text("2".to_string()),
            MockResponse::Text(org.to_string()),
            MockResponse::Password(token.to_string()),
        ]
    }

    fn run(t: &TestContext) -> Result<Exit> {
        ProvisioningSession::new(&t.ctx).run()
    }

    #[test]
    fn test_scrum_project_with_pat_then_stop() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["1"]), pat_login("contoso", "abc123"), lines(&["Demo1", "no"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        assert!(t.output.contains_text("Project created successfully."));
        assert!(t.output.contains_text(
            "Creating project 'Demo1' in organization 'contoso' using template from 'Scrum'..."
        ));
        assert_eq!(
            t.input.prompts().last().map(String::as_str),
            Some("Do you want to create another project? (yes/no): press enter to confirm")
        );

        let requests = t.projects.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].organization_name, "contoso");
        assert_eq!(requests[0].access_token.expose(), "abc123");
        assert_eq!(requests[0].project_name, "Demo1");
        assert_eq!(requests[0].template_folder, "scrum-template");
        assert!(!requests[0].extensions_present);
        assert!(!t.output.contains_text("abc123"));
    }

    #[test]
    fn test_missing_template_folder_offers_retry_or_exit() {
        let t = TestContext::new(sample_templates(), lines(&["2", "exit"]));

        assert_eq!(run(&t).unwrap(), Exit::Success);

        assert!(t.output.contains_text("Template 'Kanban' is not found"));
        assert!(t.output.contains_text("Exiting the application."));
        assert!(t.input.prompts()[1].contains("type 'retry' to try again or 'exit' to quit"));
        assert!(t.projects.requests().is_empty());
    }

    #[test]
    fn test_template_list_is_numbered_across_groups() {
        let t = TestContext::new(sample_templates(), lines(&["2", "exit"]));

        run(&t).unwrap();

        let listing: Vec<_> = t
            .output
            .get_messages()
            .into_iter()
            .filter(|m| matches!(m, OutputMessage::Subsection(_) | OutputMessage::ListItem(..)))
            .collect();
        assert_eq!(
            listing,
            vec![
                OutputMessage::Subsection("Agile".to_string()),
                OutputMessage::ListItem(1, "Scrum".to_string()),
                OutputMessage::ListItem(2, "Kanban".to_string()),
                OutputMessage::Subsection("DevOps Labs".to_string()),
                OutputMessage::ListItem(3, "Timeline Demo".to_string()),
            ]
        );
    }

    #[test]
    fn test_retry_after_missing_folder_restarts_selection() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["2", "retry", "1"]), pat_login("contoso", "abc123"), lines(&["Demo1", "n"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);
        assert_eq!(t.projects.requests().len(), 1);
        assert_eq!(t.projects.requests()[0].template_name, "Scrum");
    }

    #[test]
    fn test_invalid_template_numbers_restart_selection() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["9", "abc", "0", "1"]), pat_login("contoso", "abc123"), lines(&["Demo1", "no"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        let warnings = t
            .output
            .get_messages()
            .into_iter()
            .filter(|m| matches!(m, OutputMessage::Warning(w) if w.contains("Invalid template number entered.")))
            .count();
        assert_eq!(warnings, 3);
        assert_eq!(t.projects.requests().len(), 1);
    }

    #[test]
    fn test_invalid_project_name_then_exit_fails_without_dispatch() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["1"]), pat_login("contoso", "abc123"), lines(&["bad/name", "exit"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Failure);

        assert!(t.output.contains_text("Validation error: Project name is not valid."));
        assert!(t.projects.requests().is_empty());
    }

    #[test]
    fn test_project_name_retries_until_valid() {
        let t = TestContext::new(
            sample_templates(),
            [
                lines(&["1"]),
                pat_login("contoso", "abc123"),
                lines(&["  ", "COM1", "retry", "Demo1", "no"]),
            ]
            .concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        assert!(t.output.contains_text("Project name cannot be empty."));
        assert!(t.output.contains_text("reserved"));
        assert_eq!(t.projects.requests()[0].project_name, "Demo1");
    }

    #[test]
    fn test_rejected_credentials_restart_from_template_selection() {
        let t = TestContext::new(
            sample_templates(),
            [
                lines(&["1", "2", "   "]),
                lines(&["1"]),
                pat_login("contoso", "abc123"),
                lines(&["Demo1", "no"]),
            ]
            .concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        assert!(t.output.contains_text("Organization name cannot be empty."));
        let selections = t
            .input
            .prompts()
            .iter()
            .filter(|p| p.starts_with("Enter the template number"))
            .count();
        assert_eq!(selections, 2);
    }

    #[test]
    fn test_unknown_auth_choice_fails_before_dispatch() {
        let t = TestContext::new(sample_templates(), lines(&["1", "7", "Demo1"]));

        assert_eq!(run(&t).unwrap(), Exit::Failure);

        assert!(t.output.contains_text("Validation error: All inputs must be provided. Exiting.."));
        assert!(t.projects.requests().is_empty());
    }

    #[test]
    fn test_federated_error_is_fatal() {
        let t = TestContext::new(sample_templates(), lines(&["1", "1"]));

        assert_eq!(run(&t).unwrap(), Exit::Failure);

        assert!(t.output.has_error());
        assert!(t.output.contains_text("sign-in"));
        assert!(t.output.contains_text("Exiting the application."));
    }

    #[test]
    fn test_federated_sign_in_provisions_with_bearer() {
        let auth = MockAuthService::new()
            .with_interactive_token("bearer-1")
            .with_organizations(&["contoso"]);
        let responses = vec![
            MockResponse::Text("1".to_string()),
            MockResponse::Text("1".to_string()),
            MockResponse::Select("contoso".to_string()),
            MockResponse::Text("Demo1".to_string()),
            MockResponse::Text("no".to_string()),
        ];
        let t = TestContext::with_services(sample_templates(), responses, auth, MockProjectService::succeeding());

        assert_eq!(run(&t).unwrap(), Exit::Success);

        let request = &t.projects.requests()[0];
        assert_eq!(request.auth_scheme, crate::auth::AuthScheme::Bearer);
        assert_eq!(request.access_token.expose(), "bearer-1");
        assert_eq!(t.auth.calls(), vec!["login_client", "interactive", "profile", "organizations"]);
    }

    #[test]
    fn test_missing_catalog_is_fatal() {
        let t = TestContext::new(MockFileSystem::new(), Vec::new());

        let err = run(&t).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::CatalogMissing(_))
        ));
    }

    #[test]
    fn test_failed_creation_still_offers_another_run() {
        let t = TestContext::with_services(
            sample_templates(),
            [
                lines(&["1"]),
                pat_login("contoso", "abc123"),
                lines(&["Demo1", ""]),
                lines(&["1"]),
                pat_login("contoso", "abc123"),
                lines(&["Demo2", "no"]),
            ]
            .concat(),
            MockAuthService::new(),
            MockProjectService::failing(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        assert!(t.output.contains_text("Project creation failed."));
        let names: Vec<String> = t.projects.requests().into_iter().map(|r| r.project_name).collect();
        assert_eq!(names, vec!["Demo1", "Demo2"]);
    }

    #[test]
    fn test_service_error_is_fatal() {
        let t = TestContext::with_services(
            sample_templates(),
            [lines(&["1"]), pat_login("contoso", "abc123"), lines(&["Demo1"])].concat(),
            MockAuthService::new(),
            MockProjectService::erroring("connection reset"),
        );

        assert_eq!(run(&t).unwrap(), Exit::Failure);
        assert!(t.output.contains_text("An error occurred while creating the project: connection reset"));
    }

    #[test]
    fn test_extension_consent_reaches_the_request() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["3", "", "y"]), pat_login("contoso", "abc123"), lines(&["Demo1", "no"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        let request = &t.projects.requests()[0];
        assert!(request.extensions_present);
        assert!(request.consent_granted);
        assert_eq!(request.extensions.len(), 1);
        assert!(t.output.contains_text("Confirmed Extension installation"));
    }

    #[test]
    fn test_declined_extensions_keep_presence() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["3", "no"]), pat_login("contoso", "abc123"), lines(&["Demo1", "no"])].concat(),
        );

        assert_eq!(run(&t).unwrap(), Exit::Success);

        let request = &t.projects.requests()[0];
        assert!(request.extensions_present);
        assert!(!request.consent_granted);
    }

    #[test]
    fn test_iteration_messages_carry_the_session_id() {
        let t = TestContext::new(
            sample_templates(),
            [lines(&["1"]), pat_login("contoso", "abc123"), lines(&["Demo1", "no"])].concat(),
        );
        let id = SessionId::fixed("0badcafe");

        let outcome = ProvisioningSession::new(&t.ctx).run_iteration(&id).unwrap();

        assert_eq!(outcome, Some(Exit::Success));
        assert!(t.output.get_successes().iter().all(|s| s.starts_with("[0badcafe] ")));
        assert_eq!(t.projects.requests()[0].session_id, id);
    }
}
