//! `vmmgr delete`: stop and undefine managed instances, removing their pool disks.

use std::path::Path;

use crate::backend::{self, Backend, DomainInfo};
use crate::config::Settings;
use crate::error::VmmgrError;
use crate::external::{ExternalCommand, Runner};

/// Which instances to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Names(Vec<String>),
}

/// Managed instances picked by `selection`; unknown names are warned about and skipped.
pub fn select(managed: Vec<DomainInfo>, selection: &Selection) -> Vec<DomainInfo> {
    match selection {
        Selection::All => managed,
        Selection::Names(names) => names
            .iter()
            .filter_map(|name| {
                let found = managed.iter().find(|d| &d.name == name).cloned();
                if found.is_none() {
                    tracing::warn!(%name, "not a managed instance, skipping");
                }
                found
            })
            .collect(),
    }
}

/// `virsh` invocations that remove one instance.
pub fn removal_commands(domain: &DomainInfo, pool_root: &Path) -> Vec<ExternalCommand> {
    let mut cmds = Vec::with_capacity(2);
    if domain.state.is_running() {
        cmds.push(
            ExternalCommand::new("virsh")
                .args(["destroy", "--remove-logs", "--domain", domain.name.as_str()]),
        );
    }

    let storage = backend::disks_in_pool(domain, pool_root)
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    cmds.push(
        ExternalCommand::new("virsh")
            .args(["undefine", "--managed-save", "--storage"])
            .arg(storage)
            .args(["--domain", domain.name.as_str()]),
    );
    cmds
}

/// Removal commands for every selected instance, keyed by instance name.
pub fn plan(
    backend: &impl Backend,
    settings: &Settings,
    selection: &Selection,
) -> Result<Vec<(String, Vec<ExternalCommand>)>, VmmgrError> {
    if matches!(selection, Selection::Names(names) if names.is_empty()) {
        return Err(VmmgrError::Validation {
            message: "name the instances to delete, or pass --all".into(),
        });
    }

    let pools = backend.pools()?;
    let pool = backend::working_pool(&pools, settings)?;
    let managed = backend::managed_domains(backend.domains()?, pool);

    Ok(select(managed, selection)
        .into_iter()
        .map(|domain| {
            let cmds = removal_commands(&domain, &pool.path);
            (domain.name, cmds)
        })
        .collect())
}

pub async fn run(
    backend: &impl Backend,
    settings: &Settings,
    selection: Selection,
    runner: Runner,
) -> Result<(), VmmgrError> {
    for (name, cmds) in plan(backend, settings, &selection)? {
        for cmd in &cmds {
            runner.run(cmd).await?;
        }
        tracing::info!(%name, "instance deleted");
    }
    Ok(())
}
