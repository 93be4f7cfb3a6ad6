//! Generic plan runner
//!
//! Executes a [`Plan`] step by step, journaling the effect of every
//! completed step. On failure:
//!
//! ```text
//!   failed step <= commit boundary  ──► compensate journal in reverse ──► RolledBack
//!                                          └─ restore failed            ──► Critical
//!   failed step >  commit boundary  ──► no rollback                     ──► Inconsistent
//!   plan without commit boundary    ──► no rollback                     ──► Failed
//! ```
//!
//! Steps run strictly one after another; order is what makes the journal
//! a valid undo log.

use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::model::DnsRecord;
use crate::traits::{
    BackupStore, ContainerHandle, ContainerRuntime, DnsClient, ProxyConfigurator, ProxyReloader,
    ReloadMethod, ReloadTarget,
};

use super::result::{SagaOutcome, SagaResult};
use super::step::{Action, Plan, Step};

/// Collaborators a plan runs against
pub struct StepContext<'a> {
    pub dns: &'a dyn DnsClient,
    pub proxy: &'a dyn ProxyConfigurator,
    pub reloader: &'a dyn ProxyReloader,
    pub runtime: Option<&'a dyn ContainerRuntime>,
    pub backups: &'a dyn BackupStore,
    pub zone_id: &'a str,
    pub settings: &'a ProxyConfig,
}

/// What a completed step left behind
#[derive(Debug)]
enum Effect {
    Backup(PathBuf),
    Created(DnsRecord),
    Updated(DnsRecord),
    Nothing,
}

/// Outcome of running a plan
#[derive(Debug)]
pub struct RunReport {
    pub result: SagaResult,
    /// The config file may differ from what was last parsed
    pub wrote_file: bool,
}

/// Run `plan` to completion or first failure
pub async fn run_plan(ctx: &StepContext<'_>, plan: &Plan) -> RunReport {
    let commit = plan.commit_index();
    let mut journal: Vec<Effect> = Vec::with_capacity(plan.steps.len());
    let mut completed = vec![false; plan.steps.len()];
    let mut backup_path: Option<PathBuf> = None;
    let mut wrote_file = false;

    for (index, step) in plan.steps.iter().enumerate() {
        debug!("[{}] step {}/{}: {}", plan.operation, index + 1, plan.steps.len(), step);
        if step.action.writes_config() {
            wrote_file = true;
        }

        match execute(ctx, step, backup_path.as_deref()).await {
            Ok(effect) => {
                if let Effect::Backup(path) = &effect {
                    backup_path = Some(path.clone());
                }
                journal.push(effect);
                completed[index] = true;
            }
            Err(err) => {
                let completed_items = count_completed_items(plan, &completed);
                let post_commit = commit.is_some_and(|c| index > c);

                let (outcome, cause, rollback_failures) = if post_commit {
                    warn!(
                        "[{}] '{}' failed after commit, leaving proxy change in place: {}",
                        plan.operation, step.name, err
                    );
                    let cause = Error::StateInconsistency {
                        step: step.name.clone(),
                        source: Box::new(err),
                    };
                    (SagaOutcome::Inconsistent, cause, Vec::new())
                } else if commit.is_none() {
                    warn!("[{}] '{}' failed: {}", plan.operation, step.name, err);
                    (SagaOutcome::Failed, Error::at_step(&step.name, err), Vec::new())
                } else {
                    warn!(
                        "[{}] '{}' failed, rolling back {} completed step(s): {}",
                        plan.operation,
                        step.name,
                        journal.len(),
                        err
                    );
                    let (restore_error, failures) = compensate(ctx, &journal).await;
                    match restore_error {
                        Some(restore) => {
                            error!(
                                "[{}] restoring {} failed, config needs manual inspection: {}",
                                plan.operation,
                                ctx.settings.config_path.display(),
                                restore
                            );
                            let cause = Error::CriticalRollback {
                                step: step.name.clone(),
                                cause: Box::new(err),
                                restore: Box::new(restore),
                            };
                            (SagaOutcome::Critical, cause, failures)
                        }
                        None => (
                            SagaOutcome::RolledBack,
                            Error::at_step(&step.name, err),
                            failures,
                        ),
                    }
                };

                return RunReport {
                    result: SagaResult {
                        operation: plan.operation,
                        success: false,
                        outcome,
                        failed_step: Some(step.name.clone()),
                        backup_path,
                        affected_domains: plan.affected_domains.clone(),
                        cause: Some(cause),
                        completed_items,
                        total_items: plan.total_items,
                        rollback_failures,
                    },
                    wrote_file,
                };
            }
        }
    }

    RunReport {
        result: SagaResult::succeeded(
            plan.operation,
            plan.affected_domains.clone(),
            backup_path,
            plan.total_items,
        ),
        wrote_file,
    }
}

async fn execute(ctx: &StepContext<'_>, step: &Step, backup: Option<&Path>) -> Result<Effect> {
    let config_path = ctx.settings.config_path.as_path();
    match &step.action {
        Action::BackupConfig => {
            let path = ctx.backups.create_backup(config_path).await?;
            debug!("Backed up {} to {}", config_path.display(), path.display());
            Ok(Effect::Backup(path))
        }
        Action::CreateDnsRecord(draft) => {
            let created = ctx.dns.create_record(ctx.zone_id, draft).await?;
            if created.id.is_empty() {
                warn!(
                    "{} returned no id for {}; it cannot be rolled back",
                    ctx.dns.provider_name(),
                    created.name
                );
                return Ok(Effect::Nothing);
            }
            Ok(Effect::Created(created))
        }
        Action::UpdateDnsRecord { previous, desired } => {
            ctx.dns
                .update_record(ctx.zone_id, &previous.id, desired)
                .await?;
            Ok(Effect::Updated(previous.clone()))
        }
        Action::DeleteDnsRecord(record) => {
            ctx.dns.delete_record(ctx.zone_id, &record.id).await?;
            Ok(Effect::Nothing)
        }
        Action::AppendProxyBlock(block) => {
            ctx.proxy.append(config_path, block).await?;
            Ok(Effect::Nothing)
        }
        Action::RemoveProxyBlock(domain) => {
            ctx.proxy.remove_entry(config_path, domain).await?;
            Ok(Effect::Nothing)
        }
        Action::WriteConfig(text) => {
            let mode_source = backup.unwrap_or(config_path);
            ctx.backups
                .write_preserving_mode(config_path, text, mode_source)
                .await?;
            Ok(Effect::Nothing)
        }
        Action::ValidateAndReload => {
            let target = reload_target(ctx).await?;
            ctx.reloader.validate_and_reload(&target).await?;
            Ok(Effect::Nothing)
        }
    }
}

/// Undo the journal in reverse; returns the restore error and DNS failures
async fn compensate(ctx: &StepContext<'_>, journal: &[Effect]) -> (Option<Error>, Vec<String>) {
    let mut restore_error = None;
    let mut failures = Vec::new();

    for effect in journal.iter().rev() {
        match effect {
            Effect::Created(record) => {
                debug!("Compensating: deleting created record {}", record.name);
                if let Err(e) = ctx.dns.delete_record(ctx.zone_id, &record.id).await {
                    warn!("Could not delete {} during rollback: {}", record.name, e);
                    failures.push(format!("delete DNS record {}: {}", record.name, e));
                }
            }
            Effect::Updated(previous) => {
                debug!("Compensating: reverting record {}", previous.name);
                if let Err(e) = ctx
                    .dns
                    .update_record(ctx.zone_id, &previous.id, previous)
                    .await
                {
                    warn!("Could not revert {} during rollback: {}", previous.name, e);
                    failures.push(format!("revert DNS record {}: {}", previous.name, e));
                }
            }
            Effect::Backup(path) => {
                debug!("Compensating: restoring {}", path.display());
                if let Err(e) = ctx
                    .backups
                    .restore_from_backup(&ctx.settings.config_path, path)
                    .await
                {
                    restore_error = Some(e);
                }
            }
            Effect::Nothing => {}
        }
    }

    (restore_error, failures)
}

/// Items whose own steps all completed, counting pre-commit steps only once
/// the commit boundary was passed
fn count_completed_items(plan: &Plan, completed: &[bool]) -> usize {
    let commit = plan.commit_index();
    let committed = commit.is_none_or(|c| completed[c]);

    (0..plan.total_items)
        .filter(|item| {
            let mut own = plan
                .steps
                .iter()
                .enumerate()
                .filter(|(_, step)| step.item == Some(*item))
                .peekable();
            if own.peek().is_none() {
                return committed;
            }
            own.all(|(index, _)| {
                let pre_commit = commit.is_some_and(|c| index < c);
                completed[index] && (!pre_commit || committed)
            })
        })
        .count()
}

/// Resolve where and how the daemon is reloaded
async fn reload_target(ctx: &StepContext<'_>) -> Result<ReloadTarget> {
    let settings = ctx.settings;
    let container = match settings.reload_method {
        ReloadMethod::Host => None,
        ReloadMethod::Exec | ReloadMethod::Restart => Some(find_container(ctx).await?),
    };

    Ok(ReloadTarget {
        config_host_path: settings.config_path.clone(),
        config_container_path: settings.container_config_path.clone(),
        container,
        method: settings.reload_method,
    })
}

async fn find_container(ctx: &StepContext<'_>) -> Result<ContainerHandle> {
    let settings = ctx.settings;
    let Some(runtime) = ctx.runtime else {
        return match &settings.container_name {
            Some(name) => Ok(ContainerHandle {
                id: name.clone(),
                name: name.clone(),
                image: settings.container_image.clone(),
            }),
            None => Err(Error::config(
                "No container runtime available and no container name configured",
            )),
        };
    };

    match &settings.container_name {
        Some(name) => runtime
            .list_running(None)
            .await?
            .into_iter()
            .find(|c| &c.name == name || &c.id == name)
            .ok_or_else(|| Error::reload(format!("container '{}' is not running", name))),
        None => runtime
            .list_running(Some(&settings.container_image))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::reload(format!(
                    "no running container for image '{}'",
                    settings.container_image
                ))
            }),
    }
}
