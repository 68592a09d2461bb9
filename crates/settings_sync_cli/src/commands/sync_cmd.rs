//! Sync commands for the settings-sync CLI.
//!
//! One subcommand per triggering case:
//!
//! ```bash
//! # Apply the settings to every repository of the organization
//! settings-sync sync-all --org myorg
//!
//! # Preview the changes for one repository
//! settings-sync sync-repo --org myorg --repo api --dry-run
//!
//! # Apply a changed sub-org document
//! settings-sync sync-suborg --org myorg --path .github/suborgs/frontend.yml
//! ```

use std::{fmt, fs, path::PathBuf, sync::Arc};

use clap::{Args, Subcommand};
use config_manager::EngineSettings;
use github_client::{create_app_client, create_token_client, CheckConclusion, GitHubClient};
use settings_sync_core::{CheckRunTarget, RunContext, RunSummary, SettingsSync};
use tracing::{debug, info, instrument};

use crate::{
    config::{AppConfig, AuthenticationConfig},
    errors::Error,
};

#[cfg(test)]
#[path = "sync_cmd_tests.rs"]
mod tests;

/// Options shared by every sync subcommand.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SyncArgs {
    /// Organization whose settings are applied.
    #[arg(long)]
    pub org: String,

    /// Report the changes without making them.
    #[arg(long)]
    pub dry_run: bool,

    /// Ref of the admin repository to read the settings from.
    ///
    /// Defaults to the default branch.
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Path to the configuration file.
    #[arg(long)]
    pub config: Option<String>,

    /// Check run on the admin repository that a dry run completes.
    #[arg(long, requires = "dry_run")]
    pub check_run_id: Option<u64>,

    /// Pull request that receives the dry-run comment.
    #[arg(long, requires = "check_run_id")]
    pub pull_request: Option<u64>,
}

impl SyncArgs {
    /// Builds the run parameters. Check runs live on the admin repository.
    pub fn run_context(&self, settings: &EngineSettings) -> RunContext {
        let mut ctx = RunContext::new(self.org.as_str());
        if self.dry_run {
            ctx = ctx.dry_run();
        }
        if let Some(git_ref) = &self.git_ref {
            ctx = ctx.at_ref(git_ref.as_str());
        }
        if let Some(check_run_id) = self.check_run_id {
            ctx = ctx.reporting_to(CheckRunTarget {
                owner: self.org.clone(),
                repo: settings.admin_repo.clone(),
                check_run_id,
                pull_request_number: self.pull_request,
            });
        }
        ctx
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SyncCommands {
    /// Apply the settings to every repository of the organization
    SyncAll {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Apply the settings to a single repository
    SyncRepo {
        #[command(flatten)]
        args: SyncArgs,

        /// Name of the repository.
        #[arg(long)]
        repo: String,
    },

    /// Apply a sub-org document to the repositories it governs
    SyncSuborg {
        #[command(flatten)]
        args: SyncArgs,

        /// Path of the sub-org document in the admin repository.
        #[arg(long)]
        path: String,
    },
}

impl SyncCommands {
    pub fn args(&self) -> &SyncArgs {
        match self {
            SyncCommands::SyncAll { args }
            | SyncCommands::SyncRepo { args, .. }
            | SyncCommands::SyncSuborg { args, .. } => args,
        }
    }
}

/// Credentials used to reach GitHub.
pub enum Credentials {
    Token(String),
    App {
        app_id: u64,
        private_key_path: PathBuf,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::App {
                app_id,
                private_key_path,
            } => f
                .debug_struct("App")
                .field("app_id", app_id)
                .field("private_key_path", private_key_path)
                .finish(),
        }
    }
}

/// Picks the credentials to use. GitHub App credentials win over a token.
///
/// `lookup` reads an environment variable.
pub fn resolve_credentials(
    auth: &AuthenticationConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, Error> {
    if let (Some(app_id), Some(path)) = (auth.app_id, &auth.private_key_path) {
        return Ok(Credentials::App {
            app_id,
            private_key_path: path.clone(),
        });
    }
    match lookup(&auth.token_env) {
        Some(token) if !token.trim().is_empty() => Ok(Credentials::Token(token)),
        _ => Err(Error::Auth(format!(
            "No credentials found: set {} or configure a GitHub App",
            auth.token_env
        ))),
    }
}

/// Creates a client for the organization from the given credentials.
#[instrument(skip(credentials))]
pub async fn authenticate(credentials: &Credentials, org: &str) -> Result<GitHubClient, Error> {
    let token = match credentials {
        Credentials::Token(token) => token.clone(),
        Credentials::App {
            app_id,
            private_key_path,
        } => {
            let private_key = fs::read_to_string(private_key_path).map_err(Error::LoadFile)?;
            let app_client = create_app_client(*app_id, &private_key)
                .await
                .map_err(|e| Error::Auth(e.to_string()))?;
            GitHubClient::new(app_client)
                .get_installation_token_for_org(org)
                .await
                .map_err(|e| {
                    Error::Auth(format!("Failed to get an installation token for {org}: {e}"))
                })?
        }
    };

    let client = create_token_client(&token).map_err(|e| Error::Auth(e.to_string()))?;
    Ok(GitHubClient::new(client))
}

/// Runs the engine entry point matching the command.
///
/// Returns `None` when the repository is restricted and nothing ran.
pub async fn run(engine: &SettingsSync, cmd: &SyncCommands, ctx: &RunContext) -> Option<RunSummary> {
    match cmd {
        SyncCommands::SyncAll { .. } => Some(engine.sync_all(ctx).await),
        SyncCommands::SyncRepo { repo, .. } => engine.sync_repo(ctx, repo).await,
        SyncCommands::SyncSuborg { path, .. } => Some(engine.sync_suborg(ctx, path).await),
    }
}

/// Prints the dry-run report and turns a failed run into an error.
pub fn report(summary: Option<RunSummary>) -> Result<(), Error> {
    let Some(summary) = summary else {
        info!("Repository is restricted, nothing to sync");
        return Ok(());
    };

    if !summary.results.is_empty() {
        println!("{}", summary.report);
    }

    if summary.conclusion == CheckConclusion::Failure {
        let failures =
            summary.errors.len() + summary.results.iter().filter(|r| r.is_error()).count();
        return Err(Error::Engine(format!("{failures} error(s)")));
    }
    Ok(())
}

/// Executes a sync command.
pub async fn execute(cmd: &SyncCommands) -> Result<(), Error> {
    let args = cmd.args();
    let config = AppConfig::resolve(args.config.as_deref())?;
    debug!(admin_repo = %config.engine.admin_repo, "Loaded configuration");

    let credentials = resolve_credentials(&config.authentication, |name| std::env::var(name).ok())?;
    let client = authenticate(&credentials, &args.org).await?;

    let engine = SettingsSync::new(Arc::new(client), config.engine);
    let ctx = args.run_context(engine.settings());
    report(run(&engine, cmd, &ctx).await)
}
