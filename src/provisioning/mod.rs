pub mod project_service;
pub mod request;
pub mod session;

pub use project_service::{AzureDevOpsProjectService, ProjectService};
pub use request::ProvisioningRequest;
pub use session::{Exit, ProvisioningSession};
