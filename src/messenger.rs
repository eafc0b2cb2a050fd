//! Session-tagged console messages.
//!
//! Each provisioning iteration gets a short random id. Every message the
//! iteration prints carries that id so interleaved runs in a scrollback can
//! be told apart.

use crate::traits::Output;
use std::fmt;
use uuid::Uuid;

/// Short identifier of one provisioning iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    /// First hyphen-separated group of a random v4 uuid (8 hex chars)
    pub fn generate() -> Self {
        let id = Uuid::new_v4().to_string();
        let short = id.split('-').next().unwrap_or(&id).to_string();
        Self(short)
    }
}

#[cfg(test)]
impl SessionId {
    pub fn fixed(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Writes messages for one session through the injected output
pub struct Messenger<'a> {
    id: &'a SessionId,
    output: &'a dyn Output,
}

impl<'a> Messenger<'a> {
    pub fn new(id: &'a SessionId, output: &'a dyn Output) -> Self {
        Self { id, output }
    }

    /// Untagged access for layout-only output (headers, lists)
    pub fn output(&self) -> &dyn Output {
        self.output
    }

    fn tag(&self, message: &str) -> String {
        format!("[{}] {}", self.id, message)
    }

    pub fn info(&self, message: &str) {
        self.output.info(&self.tag(message));
    }

    pub fn success(&self, message: &str) {
        self.output.success(&self.tag(message));
    }

    pub fn warning(&self, message: &str) {
        self.output.warning(&self.tag(message));
    }

    pub fn error(&self, message: &str) {
        self.output.error(&self.tag(message));
    }

    pub fn dimmed(&self, message: &str) {
        self.output.dimmed(&self.tag(message));
    }
}
