use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Response type for mock user input
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum MockResponse {
    Select(String),
    Text(String),
    Password(String),
}

/// Trait for user input operations to enable testing with mocks
pub trait UserInput: Send + Sync {
    /// Display a selection prompt with options
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<String>;

    /// Read one free-form line; blank input is returned as an empty string
    fn text(&self, prompt: &str) -> Result<String>;

    /// Read a secret with masked echo
    fn password(&self, prompt: &str) -> Result<String>;
}

/// Real user input implementation using inquire crate
pub struct InquireUserInput;

impl UserInput for InquireUserInput {
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<String> {
        use inquire::Select;
        let answer = Select::new(prompt, options).prompt()?;
        Ok(answer)
    }

    fn text(&self, prompt: &str) -> Result<String> {
        use inquire::Text;
        let answer = Text::new(prompt).prompt()?;
        Ok(answer)
    }

    fn password(&self, prompt: &str) -> Result<String> {
        use inquire::{Password, PasswordDisplayMode};
        let answer = Password::new(prompt)
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()?;
        Ok(answer)
    }
}

/// Mock user input implementation for testing
#[allow(dead_code)]
pub struct MockUserInput {
    responses: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockUserInput {
    /// Create new mock with no pre-configured responses
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    /// Create mock with pre-configured responses
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue text answers in order
    pub fn with_lines(lines: &[&str]) -> Self {
        Self::with_responses(
            lines
                .iter()
                .map(|line| MockResponse::Text(line.to_string()))
                .collect(),
        )
    }

    /// Add a response to the queue
    pub fn add_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Responses that were never consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Every prompt shown so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Get the next response from the queue
    fn next_response(&self, prompt: &str) -> Result<MockResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("No more mock responses available (prompt: {})", prompt))
    }
}

impl Default for MockUserInput {
    fn default() -> Self {
        Self::new()
    }
}

impl UserInput for MockUserInput {
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<String> {
        match self.next_response(prompt)? {
            MockResponse::Select(answer) => {
                if options.contains(&answer) {
                    Ok(answer)
                } else {
                    anyhow::bail!(
                        "Mock response '{}' is not in the provided options: {:?}",
                        answer,
                        options
                    )
                }
            }
            other => anyhow::bail!("Expected Select response but got {:?}", other),
        }
    }

    fn text(&self, prompt: &str) -> Result<String> {
        match self.next_response(prompt)? {
            MockResponse::Text(answer) => Ok(answer),
            other => anyhow::bail!("Expected Text response but got {:?}", other),
        }
    }

    fn password(&self, prompt: &str) -> Result<String> {
        match self.next_response(prompt)? {
            MockResponse::Password(answer) => Ok(answer),
            other => anyhow::bail!("Expected Password response but got {:?}", other),
        }
    }
}
