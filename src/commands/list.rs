//! `vmmgr list`

use crate::backend::{self, Backend, DomainInfo};
use crate::cli::ListFormat;
use crate::config::Settings;
use crate::error::VmmgrError;
use crate::listing;

/// Managed instances, ordered by name.
pub fn instances(backend: &impl Backend, settings: &Settings) -> Result<Vec<DomainInfo>, VmmgrError> {
    let pools = backend.pools()?;
    let pool = backend::working_pool(&pools, settings)?;
    let mut managed = backend::managed_domains(backend.domains()?, pool);
    managed.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(managed)
}

pub fn run(backend: &impl Backend, settings: &Settings, format: ListFormat) -> Result<(), VmmgrError> {
    let managed = instances(backend, settings)?;
    println!(
        "{}",
        listing::render(format, &managed, &settings.users, &settings.ssh_dir)
    );
    Ok(())
}
