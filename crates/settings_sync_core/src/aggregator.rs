//! Collects the outcome of a run and reports it.
//!
//! Live runs create a completed check run on the admin repository. Dry runs
//! buffer every action, render a report and complete the check run that
//! triggered them, optionally posting the report on the pull request first.

use crate::{results::ChangeCounts, ActionType, ReconcileAction, RunError, SyncResult};
use chrono::{SecondsFormat, Utc};
use config_manager::EngineSettings;
use github_client::{CheckConclusion, CheckRunOutput, CheckRunPayload, Error as GitHubError, SettingsClient};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Write,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;

/// Largest report body sent to GitHub, in bytes, before the suffix.
pub const REPORT_LIMIT: usize = 55_536;
pub const TRUNCATION_SUFFIX: &str = "... (too many changes to report)";
pub const CHECK_RUN_NAME: &str = "settings-sync";

/// Cuts `text` to [`REPORT_LIMIT`] bytes on a character boundary and appends
/// [`TRUNCATION_SUFFIX`]. Text within the limit is returned unchanged.
pub fn truncate_report(text: &str) -> String {
    if text.len() <= REPORT_LIMIT {
        return text.to_string();
    }
    let mut end = REPORT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_SUFFIX)
}

/// Where a dry run reports back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunTarget {
    pub owner: String,
    pub repo: String,
    pub check_run_id: u64,
    pub pull_request_number: Option<u64>,
}

/// Dry-run results bucketed for the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub repos_processed: BTreeSet<String>,
    /// plugin → repository → change counts of each action.
    pub changes: BTreeMap<String, BTreeMap<String, Vec<ChangeCounts>>>,
    /// repository → error messages.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl RunStats {
    pub fn from_results(results: &[SyncResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            stats.repos_processed.insert(result.repo.clone());
            if result.is_error() {
                stats
                    .errors
                    .entry(result.repo.clone())
                    .or_default()
                    .push(result.action.msg.clone());
            } else if result.action.has_changes() {
                stats
                    .changes
                    .entry(result.plugin.clone())
                    .or_default()
                    .entry(result.repo.clone())
                    .or_default()
                    .push(result.action.counts());
            }
        }
        stats
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Final state of a run, as returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub conclusion: CheckConclusion,
    /// Deduplicated results (dry run only; empty in live mode).
    pub results: Vec<SyncResult>,
    pub errors: Vec<RunError>,
    /// The rendered check run body, before truncation.
    pub report: String,
}

/// Accumulates results from every reconciler of a run.
///
/// Appends may come from many tasks at once.
#[derive(Debug)]
pub struct ResultAggregator {
    nop: bool,
    results: Mutex<Vec<SyncResult>>,
}

impl ResultAggregator {
    pub fn new(nop: bool) -> Self {
        Self {
            nop,
            results: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SyncResult>> {
        self.results.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records actions. Only dry runs keep them.
    pub fn append(&self, actions: impl IntoIterator<Item = ReconcileAction>) {
        if !self.nop {
            return;
        }
        self.lock().extend(actions.into_iter().map(SyncResult::from));
    }

    /// Buffered results without repeated `(type, repo, plugin)` entries,
    /// keeping the first of each.
    pub fn results(&self) -> Vec<SyncResult> {
        let results = self.lock();
        let mut seen = HashSet::new();
        results
            .iter()
            .filter(|r| seen.insert((r.result_type, r.repo.clone(), r.plugin.clone())))
            .cloned()
            .collect()
    }

    /// Reports the run and returns its summary.
    ///
    /// Reporting failures are logged, never returned: the run itself already
    /// happened.
    #[instrument(skip(self, client, settings, errors, check_run), fields(nop = self.nop))]
    pub async fn finish(
        &self,
        client: &dyn SettingsClient,
        settings: &EngineSettings,
        owner: &str,
        errors: Vec<RunError>,
        check_run: Option<&CheckRunTarget>,
    ) -> RunSummary {
        if self.nop {
            self.finish_dry_run(client, settings, errors, check_run).await
        } else {
            self.finish_live(client, settings, owner, errors).await
        }
    }

    async fn finish_live(
        &self,
        client: &dyn SettingsClient,
        settings: &EngineSettings,
        owner: &str,
        errors: Vec<RunError>,
    ) -> RunSummary {
        let started_at = timestamp();
        let (conclusion, summary, text) = if errors.is_empty() {
            (
                CheckConclusion::Success,
                format!("{CHECK_RUN_NAME} finished successfully."),
                format!("Run on: `{started_at}`"),
            )
        } else {
            (
                CheckConclusion::Failure,
                format!("{CHECK_RUN_NAME} finished with errors."),
                render_errors(&errors),
            )
        };

        match client.latest_commit_sha(owner, &settings.admin_repo).await {
            Ok(head_sha) => {
                let payload = CheckRunPayload {
                    name: Some(CHECK_RUN_NAME.to_string()),
                    head_sha: Some(head_sha),
                    status: "completed".to_string(),
                    conclusion,
                    started_at: Some(started_at),
                    completed_at: Some(timestamp()),
                    output: CheckRunOutput {
                        title: CHECK_RUN_NAME.to_string(),
                        summary,
                        text: Some(truncate_report(&text)),
                    },
                };
                match client
                    .create_check_run(owner, &settings.admin_repo, &payload)
                    .await
                {
                    Ok(()) => info!(owner = owner, "Created check run"),
                    Err(e) => error!(owner = owner, error = %e, "Failed to create check run"),
                }
            }
            Err(GitHubError::NotFound) => {
                error!(owner = owner, repo = %settings.admin_repo, "Admin repository not found")
            }
            Err(e) => error!(owner = owner, error = %e, "Failed to find admin repository commit"),
        }

        RunSummary {
            conclusion,
            results: Vec::new(),
            errors,
            report: text,
        }
    }

    async fn finish_dry_run(
        &self,
        client: &dyn SettingsClient,
        settings: &EngineSettings,
        errors: Vec<RunError>,
        check_run: Option<&CheckRunTarget>,
    ) -> RunSummary {
        let results = self.results();
        let stats = RunStats::from_results(&results);
        let failed = stats.has_errors() || !errors.is_empty();
        let conclusion = if failed {
            CheckConclusion::Failure
        } else {
            CheckConclusion::Success
        };

        let mut report = render_report(&stats);
        if !errors.is_empty() {
            report.push('\n');
            report.push_str(&render_errors(&errors));
        }
        debug!(results = results.len(), "Rendered dry-run report");

        if let Some(target) = check_run {
            if let (true, Some(number)) = (settings.create_pr_comment, target.pull_request_number) {
                let comment = truncate_report(&render_comment(&results));
                if let Err(e) = client
                    .create_issue_comment(&target.owner, &target.repo, number, &comment)
                    .await
                {
                    error!(pull_request = number, error = %e, "Failed to post dry-run comment");
                }
            }

            let title = if failed {
                "Dry-Run Finished with Error"
            } else {
                "Dry-Run Finished with success"
            };
            let payload = CheckRunPayload {
                name: None,
                head_sha: None,
                status: "completed".to_string(),
                conclusion,
                started_at: None,
                completed_at: Some(timestamp()),
                output: CheckRunOutput {
                    title: title.to_string(),
                    summary: truncate_report(&report),
                    text: None,
                },
            };
            if let Err(e) = client
                .update_check_run(&target.owner, &target.repo, target.check_run_id, &payload)
                .await
            {
                error!(check_run = target.check_run_id, error = %e, "Failed to complete check run");
            }
        }

        RunSummary {
            conclusion,
            results,
            errors,
            report,
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Markdown summary used as the dry-run check run body.
pub fn render_report(stats: &RunStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#### {CHECK_RUN_NAME} dry run");
    let _ = writeln!(out);
    let _ = writeln!(out, "Repositories processed: {}", stats.repos_processed.len());

    if !stats.changes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "| Plugin | Repository | Additions | Deletions | Modifications |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for (plugin, repos) in &stats.changes {
            for (repo, counts) in repos {
                let total = counts.iter().fold(ChangeCounts::default(), |acc, c| ChangeCounts {
                    additions: acc.additions + c.additions,
                    deletions: acc.deletions + c.deletions,
                    modifications: acc.modifications + c.modifications,
                });
                let _ = writeln!(
                    out,
                    "| {plugin} | {repo} | {} | {} | {} |",
                    total.additions, total.deletions, total.modifications
                );
            }
        }
    }

    if stats.has_errors() {
        let _ = writeln!(out);
        let _ = writeln!(out, "##### Errors");
        let _ = writeln!(out);
        for (repo, messages) in &stats.errors {
            for msg in messages {
                let _ = writeln!(out, "- ❗ **{repo}**: {msg}");
            }
        }
    }
    out
}

/// HTML table posted on the pull request. Error rows are flagged with ❗,
/// change rows with ✋; rows without changes are left out.
pub fn render_comment(results: &[SyncResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#### :robot: {CHECK_RUN_NAME} config changes detected:");
    let _ = writeln!(out);
    out.push_str(
        "<table>\n<thead>\n<tr><th>Msg</th><th>Plugin</th><th>Repo</th>\
         <th>Additions</th><th>Deletions</th><th>Modifications</th></tr>\n</thead>\n<tbody>\n",
    );
    for result in results {
        let msg = match result.result_type {
            ActionType::Error => format!("❗ {}", result.action.msg),
            _ if result.action.has_changes() => "✋".to_string(),
            _ => continue,
        };
        let _ = writeln!(
            out,
            "<tr><td> {msg} </td><td> {} </td><td> {} </td><td> {} </td><td> {} </td><td> {} </td></tr>",
            result.plugin,
            result.repo,
            prettify(result.action.additions.as_ref()),
            prettify(result.action.deletions.as_ref()),
            prettify(result.action.modifications.as_ref()),
        );
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

/// Markdown list of run-level errors for the live check run.
pub fn render_errors(errors: &[RunError]) -> String {
    let mut out = String::from("#### Errors\n\n");
    for e in errors {
        let _ = writeln!(out, "- `{}/{}` ({}): {}", e.owner, e.repo, e.plugin, e.msg);
    }
    out
}

fn prettify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => serde_json::to_string_pretty(value)
            .unwrap_or_default()
            .replace('\n', "<br>")
            .replace(' ', "&nbsp;"),
    }
}
