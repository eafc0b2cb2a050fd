mod auth;
mod config;
mod context;
mod error;
mod messenger;
mod output;
mod provisioning;
mod template;
#[cfg(test)]
mod test_helpers;
mod traits;
mod validation;

use anyhow::Result;
use clap::Parser;
use config::Settings;
use context::Context;
use provisioning::{Exit, ProvisioningSession};
use std::path::PathBuf;
use std::process::ExitCode;
use traits::RealFileSystem;

#[derive(Parser)]
#[command(name = "demogen")]
#[command(about = "Azure DevOps Demo Generator - provision demo projects from a template catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Template root holding TemplateSetting.json (defaults to ./Templates)
    #[arg(long, env = "DEMOGEN_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Settings file (defaults to ./appsettings.json when present)
    #[arg(long, env = "DEMOGEN_SETTINGS")]
    settings: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    output::info(
        "Welcome to Azure DevOps Demo Generator! This tool will help you generate a demo environment for Azure DevOps.",
    );

    match run(&cli) {
        Ok(exit) => exit.into(),
        Err(e) => {
            output::error(&format!("An error occurred: {:#}", e));
            output::info("Exiting the application.");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Exit> {
    let settings =
        Settings::load(&RealFileSystem, cli.settings.as_deref())?.with_templates_dir(cli.templates.clone());
    let ctx = Context::new(settings)?;
    ProvisioningSession::new(&ctx).run()
}
