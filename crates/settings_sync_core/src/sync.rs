//! The sync driver.
//!
//! [`SettingsSync`] exposes one entry point per triggering case:
//!
//! - [`SettingsSync::sync_all`]: the org-level sections, then every
//!   repository of the installation plus the repositories only named in
//!   override files;
//! - [`SettingsSync::sync_repo`]: a single repository;
//! - [`SettingsSync::sync_suborg`]: the repositories governed by one changed
//!   sub-org document.
//!
//! Each run loads the settings documents, computes the effective
//! configuration of every repository, reconciles it and reports through a
//! [`ResultAggregator`]. A failing repository never stops the others: dry
//! runs record an `ERROR` result for it, live runs record a run error that
//! fails the check run.

use crate::{
    aggregator::{CheckRunTarget, ResultAggregator, RunSummary},
    plugins::{PluginRegistry, ResourcePlugin, Scope, Target},
    reconciler::Reconciler,
    repository::{ArchiveGate, RepositoryPlugin, REPOSITORY_SECTION},
    EngineError, EngineResult, ReconcileAction, RunError,
};
use config_manager::{
    ConfigStore, ConfigurationError, ConfigurationMerger, ConfigurationResult, EngineSettings,
    GitHubConfigStore, OrgConfig, OverrideFilter, PredicateCatalog, RepoOverride, SubOrgConfig,
    SubOrgMap, SubOrgResolver, ValidationContext, ValidatorRegistry,
};
use futures::future::{join_all, try_join_all};
use github_client::SettingsClient;
use serde_json::{json, Value};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;

/// Plugin name used for failures of the driver itself.
pub const DRIVER_PLUGIN: &str = "settings";

const ORG_SECTIONS: &[&str] = &["rulesets"];
const NON_PLUGIN_SECTIONS: &[&str] = &[REPOSITORY_SECTION, "repositories"];

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub owner: String,
    /// Ref of the admin repository to read settings from; default branch when unset.
    pub git_ref: Option<String>,
    /// Dry run: report changes without making them.
    pub nop: bool,
    /// The check run a dry run completes.
    pub check_run: Option<CheckRunTarget>,
}

impl RunContext {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            git_ref: None,
            nop: false,
            check_run: None,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.nop = true;
        self
    }

    pub fn at_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn reporting_to(mut self, check_run: CheckRunTarget) -> Self {
        self.check_run = Some(check_run);
        self
    }
}

/// Enforces the settings documents of an organization.
pub struct SettingsSync {
    client: Arc<dyn SettingsClient>,
    store: Arc<dyn ConfigStore>,
    settings: EngineSettings,
    plugins: PluginRegistry,
    merger: ConfigurationMerger,
    catalog: PredicateCatalog,
}

impl SettingsSync {
    /// Creates a driver reading settings from the admin repository, with the
    /// built-in plugins and validator predicates.
    pub fn new(client: Arc<dyn SettingsClient>, settings: EngineSettings) -> Self {
        let store = Arc::new(GitHubConfigStore::new(client.clone(), settings.clone()));
        Self {
            client,
            store,
            settings,
            plugins: PluginRegistry::builtin(),
            merger: ConfigurationMerger::new(),
            catalog: PredicateCatalog::builtin(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_merger(mut self, merger: ConfigurationMerger) -> Self {
        self.merger = merger;
        self
    }

    pub fn with_catalog(mut self, catalog: PredicateCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Syncs the org-level sections and every repository.
    #[instrument(skip(self, ctx), fields(owner = %ctx.owner, nop = ctx.nop))]
    pub async fn sync_all(&self, ctx: &RunContext) -> RunSummary {
        let mut run = Run::new(self, ctx);
        let outcome = match run.load(RunMode::Fleet).await {
            Ok(()) => {
                run.update_org().await;
                run.update_all().await
            }
            Err(e) => Err(e),
        };
        run.finish(outcome).await
    }

    /// Syncs one repository. Returns `None` without reporting when the
    /// repository is restricted.
    #[instrument(skip(self, ctx), fields(owner = %ctx.owner, nop = ctx.nop))]
    pub async fn sync_repo(&self, ctx: &RunContext, repo: &str) -> Option<RunSummary> {
        let mut run = Run::new(self, ctx);
        let outcome = run.load(RunMode::Repository(repo)).await;
        if outcome.is_ok() {
            if run.is_restricted(repo) {
                info!(repo = repo, "Repository is restricted, skipping");
                return None;
            }
            run.update_repo(&ctx.owner, repo).await;
        }
        Some(run.finish(outcome).await)
    }

    /// Syncs the repositories governed by the sub-org document at `source`.
    #[instrument(skip(self, ctx), fields(owner = %ctx.owner, nop = ctx.nop))]
    pub async fn sync_suborg(&self, ctx: &RunContext, source: &str) -> RunSummary {
        let mut run = Run::new(self, ctx);
        let outcome = match run.load(RunMode::SubOrg(source)).await {
            Ok(()) => run.update_all().await,
            Err(e) => Err(e),
        };
        run.finish(outcome).await
    }
}

#[derive(Debug, Clone, Copy)]
enum RunMode<'s> {
    Fleet,
    Repository(&'s str),
    /// Source path of the changed sub-org document.
    SubOrg(&'s str),
}

#[derive(Default)]
struct LoadedConfig {
    org: OrgConfig,
    suborgs: SubOrgMap,
    overrides: Vec<RepoOverride>,
    validators: ValidatorRegistry,
    /// Only repositories governed by a sub-org are processed.
    suborg_scoped: bool,
}

/// State of one run.
struct Run<'a> {
    engine: &'a SettingsSync,
    ctx: &'a RunContext,
    config: LoadedConfig,
    aggregator: ResultAggregator,
    errors: Mutex<Vec<RunError>>,
}

impl<'a> Run<'a> {
    fn new(engine: &'a SettingsSync, ctx: &'a RunContext) -> Self {
        Self {
            engine,
            ctx,
            config: LoadedConfig::default(),
            aggregator: ResultAggregator::new(ctx.nop),
            errors: Mutex::new(Vec::new()),
        }
    }

    fn client(&self) -> &dyn SettingsClient {
        self.engine.client.as_ref()
    }

    async fn load(&mut self, mode: RunMode<'_>) -> EngineResult<()> {
        let store = self.engine.store.clone();
        let owner = self.ctx.owner.as_str();
        let git_ref = self.ctx.git_ref.as_deref();

        let org = self.recover(
            "load_org_config",
            store.load_org_config(owner, git_ref).await,
        )?;
        let validators = ValidatorRegistry::compile(
            org.config_validators(),
            org.override_validators(),
            &self.engine.catalog,
        )?;

        let documents: Vec<SubOrgConfig> = self.recover(
            "load_suborg_configs",
            store.load_suborg_configs(owner, git_ref).await,
        )?;
        let changed_source = match mode {
            RunMode::SubOrg(source) => Some(source),
            _ => None,
        };
        let suborgs = self.recover(
            "resolve_suborgs",
            SubOrgResolver::new(self.client(), owner)
                .resolve(&documents, changed_source)
                .await,
        )?;

        let filter = match mode {
            RunMode::Fleet => OverrideFilter::All,
            RunMode::Repository(repo) => OverrideFilter::Repository(repo),
            RunMode::SubOrg(_) => OverrideFilter::SubOrg(&suborgs),
        };
        let overrides = self.recover(
            "load_repo_overrides",
            store.load_repo_overrides(owner, git_ref, filter).await,
        )?;

        debug!(
            suborg_entries = suborgs.len(),
            overrides = overrides.len(),
            "Loaded settings documents"
        );
        self.config = LoadedConfig {
            org,
            suborgs,
            overrides,
            validators,
            suborg_scoped: changed_source.is_some(),
        };
        Ok(())
    }

    /// Dry runs turn a failed load into an `ERROR` result and carry on with
    /// nothing loaded. Conflicts and live-run failures abort the run.
    fn recover<T: Default>(&self, step: &str, result: ConfigurationResult<T>) -> EngineResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if self.ctx.nop && !e.is_structural() => {
                error!(step = step, error = %e, "Failed to load settings");
                self.aggregator.append([ReconcileAction::error(
                    step,
                    &self.engine.settings.admin_repo,
                    e.to_string(),
                )]);
                Ok(T::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_restricted(&self, repo: &str) -> bool {
        self.config.org.restricted_repos().is_restricted(repo)
    }

    /// Records a failure isolated to one repository (or the org).
    fn isolate(&self, owner: &str, repo: &str, err: EngineError) {
        let plugin = match &err {
            EngineError::Reconcile { plugin, .. } => plugin.clone(),
            EngineError::Configuration(ConfigurationError::ValidationRejected { section, .. }) => {
                section.clone()
            }
            _ => DRIVER_PLUGIN.to_string(),
        };
        error!(owner = owner, repo = repo, plugin = %plugin, error = %err, "Failed to sync settings");
        if self.ctx.nop {
            self.aggregator
                .append([ReconcileAction::error(&plugin, repo, err.to_string())]);
        } else {
            self.errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RunError {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    msg: err.to_string(),
                    plugin,
                });
        }
    }

    /// Syncs the org-level sections of the base document against the org.
    async fn update_org(&self) {
        let owner = self.ctx.owner.as_str();
        let target = Target::organization(owner);

        for name in ORG_SECTIONS {
            let Some(section) = self.config.org.section(name) else {
                continue;
            };
            let Some(plugin) = self
                .engine
                .plugins
                .get(name)
                .filter(|p| p.supports(Scope::Organization))
            else {
                continue;
            };

            match Reconciler::new(plugin.as_ref(), self.client(), self.ctx.nop)
                .sync(&target, section)
                .await
            {
                Ok(actions) => self.aggregator.append(actions),
                Err(e) => self.isolate(owner, owner, e),
            }
        }
    }

    /// Syncs every installation repository, then every repository only named
    /// in an override document, skipping restricted ones.
    async fn update_all(&self) -> EngineResult<()> {
        let installed = self.client().list_installation_repositories().await?;

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for repo in installed {
            if self.is_restricted(&repo.name) {
                debug!(repo = %repo.name, "Skipping restricted repository");
                continue;
            }
            let key = (repo.owner_login().to_string(), repo.name.clone());
            if seen.insert(key.clone()) {
                targets.push(key);
            }
        }

        for document in &self.config.overrides {
            let declares_name = document
                .section(REPOSITORY_SECTION)
                .and_then(|r| r.get("name"))
                .is_some();
            if !declares_name {
                continue;
            }
            let name = document.repository_name().to_string();
            if self.is_restricted(&name) {
                continue;
            }
            let owner = document
                .repository_owner()
                .unwrap_or(self.ctx.owner.as_str())
                .to_string();
            let key = (owner, name);
            if seen.insert(key.clone()) {
                info!(owner = %key.0, repo = %key.1, "Syncing repository named only in settings");
                targets.push(key);
            }
        }

        join_all(
            targets
                .iter()
                .map(|(owner, name)| self.update_repo(owner, name)),
        )
        .await;
        Ok(())
    }

    async fn update_repo(&self, owner: &str, repo: &str) {
        if let Err(e) = self.try_update_repo(owner, repo).await {
            self.isolate(owner, repo, e);
        }
    }

    #[instrument(skip(self))]
    async fn try_update_repo(&self, owner: &str, repo: &str) -> EngineResult<()> {
        let suborg = self.config.suborgs.lookup(repo);
        if self.config.suborg_scoped && suborg.is_none() {
            debug!("Repository is not governed by the changed sub-org, skipping");
            return Ok(());
        }
        let repo_override = self.override_for(repo);

        let repo_config = self.repository_config(owner, repo, suborg, repo_override);
        let gate = ArchiveGate::new(self.client(), self.ctx.nop)
            .check(owner, repo, repo_config.as_ref())
            .await?;
        self.aggregator.append(gate.actions);
        if !gate.should_continue {
            return Ok(());
        }

        let children = self.child_sections(owner, repo, suborg, repo_override)?;

        // The repository has to exist before anything inside it is reconciled,
        // so its plugin runs alone and the child reconcilers fan out after it.
        if let Some(config) = &repo_config {
            let actions = RepositoryPlugin
                .sync(self.client(), owner, repo, config, self.ctx.nop)
                .await?;
            self.aggregator.append(actions);
        } else {
            debug!("No repository section declared");
        }

        let target = Target::repository(owner, repo);
        let runs = children.iter().map(|(plugin, section)| {
            let target = &target;
            async move {
                Reconciler::new(plugin.as_ref(), self.client(), self.ctx.nop)
                    .sync(target, section)
                    .await
            }
        });
        let actions = try_join_all(runs).await?;
        self.aggregator.append(actions.into_iter().flatten());
        Ok(())
    }

    fn override_for(&self, repo: &str) -> Option<&RepoOverride> {
        self.config
            .overrides
            .iter()
            .find(|o| o.name() == repo)
            .or_else(|| {
                self.config
                    .overrides
                    .iter()
                    .find(|o| o.repository_name() == repo)
            })
    }

    /// Merges the `repository` section of every layer, with the repository
    /// identity injected into the org and sub-org layers.
    fn repository_config(
        &self,
        owner: &str,
        repo: &str,
        suborg: Option<&SubOrgConfig>,
        repo_override: Option<&RepoOverride>,
    ) -> Option<Value> {
        let merger = &self.engine.merger;
        let identity = json!({ "name": repo, "org": owner });
        let with_identity =
            |layer: &Value| merger.merge_deep(REPOSITORY_SECTION, layer, &identity);

        let base = self.config.org.section(REPOSITORY_SECTION).map(with_identity);
        let from_suborg = suborg
            .and_then(|s| s.section(REPOSITORY_SECTION))
            .map(with_identity);
        let from_override = repo_override.and_then(|o| o.section(REPOSITORY_SECTION));

        merger.merge_section(
            REPOSITORY_SECTION,
            &[base.as_ref(), from_suborg.as_ref(), from_override],
        )
    }

    /// Validates every effective section and pairs each known section with
    /// its plugin. Org-level sections of the base document are left out.
    fn child_sections(
        &self,
        owner: &str,
        repo: &str,
        suborg: Option<&SubOrgConfig>,
        repo_override: Option<&RepoOverride>,
    ) -> EngineResult<Vec<(Arc<dyn ResourcePlugin>, Value)>> {
        let mut base = self.config.org.sections().clone();
        for name in ORG_SECTIONS {
            base.remove(*name);
        }
        let effective = self.engine.merger.merge_sections(&[
            Some(&base),
            suborg.map(SubOrgConfig::sections),
            repo_override.map(RepoOverride::sections),
        ]);

        let mut children = Vec::new();
        for (section, value) in &effective {
            let ctx = ValidationContext::new(owner, repo, section);
            self.config
                .validators
                .validate(self.config.org.section(section), value, &ctx)?;

            if NON_PLUGIN_SECTIONS.contains(&section.as_str()) {
                continue;
            }
            match self.engine.plugins.get(section) {
                Some(plugin) if plugin.supports(Scope::Repository) => {
                    children.push((plugin.clone(), value.clone()));
                }
                Some(_) => debug!(section = %section, "Section is not reconciled per repository"),
                None => debug!(section = %section, "Ignoring unknown section"),
            }
        }
        Ok(children)
    }

    async fn finish(self, outcome: EngineResult<()>) -> RunSummary {
        let owner = self.ctx.owner.as_str();
        let admin_repo = self.engine.settings.admin_repo.as_str();
        let mut errors = self.errors.into_inner().unwrap_or_else(|e| e.into_inner());

        if let Err(e) = outcome {
            error!(owner = owner, error = %e, "Settings sync aborted");
            errors.push(RunError {
                owner: owner.to_string(),
                repo: admin_repo.to_string(),
                msg: e.to_string(),
                plugin: DRIVER_PLUGIN.to_string(),
            });
        }
        if !errors.is_empty() {
            warn!(owner = owner, errors = errors.len(), "Settings sync finished with errors");
        }

        self.aggregator
            .finish(
                self.engine.client.as_ref(),
                &self.engine.settings,
                owner,
                errors,
                self.ctx.check_run.as_ref(),
            )
            .await
    }
}
