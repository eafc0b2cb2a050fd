use crate::auth::{AuthService, DeviceCodeAuthService};
use crate::config::Settings;
use crate::provisioning::{AzureDevOpsProjectService, ProjectService};
use crate::traits::{
    FileSystem, HttpClient, InquireUserInput, Output, RealFileSystem, ReqwestClient, TerminalOutput,
    UserInput,
};
use anyhow::Result;
use std::sync::Arc;

/// Application context that holds all dependencies for dependency injection
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub input: Arc<dyn UserInput>,
    pub output: Arc<dyn Output>,
    pub auth: Arc<dyn AuthService>,
    pub projects: Arc<dyn ProjectService>,
    pub settings: Arc<Settings>,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new(settings: Settings) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let output: Arc<dyn Output> = Arc::new(TerminalOutput);
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);

        let auth = Arc::new(DeviceCodeAuthService::new(settings.auth.clone(), Arc::clone(&http)));
        let projects = Arc::new(AzureDevOpsProjectService::new(
            settings.devops.clone(),
            settings.templates_dir.clone(),
            http,
            Arc::clone(&fs),
            Arc::clone(&output),
        ));

        Ok(Self {
            fs,
            input: Arc::new(InquireUserInput),
            output,
            auth,
            projects,
            settings: Arc::new(settings),
        })
    }

    /// Create a test context with specific mock implementations
    #[cfg(test)]
    pub fn test_with(
        fs: Arc<dyn FileSystem>,
        input: Arc<dyn UserInput>,
        output: Arc<dyn Output>,
        auth: Arc<dyn AuthService>,
        projects: Arc<dyn ProjectService>,
        settings: Settings,
    ) -> Self {
        Self {
            fs,
            input,
            output,
            auth,
            projects,
            settings: Arc::new(settings),
        }
    }
}
