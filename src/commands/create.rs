//! `vmmgr create`: clone a template into the working pool and define a VM on it.

use std::path::PathBuf;

use crate::backend::{self, Backend};
use crate::cloudinit::{self, StagedSeed};
use crate::config::Settings;
use crate::error::VmmgrError;
use crate::external::{ExternalCommand, Runner};
use crate::naming;
use crate::osinfo;
use crate::paths;
use crate::template::{self, TemplateCandidate};
use crate::util::DiskSize;

/// Flags that already pin the guest OS for `virt-install`.
const OS_FLAGS: &[&str] = &["--osinfo", "--os-variant"];

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub pattern: Option<String>,
    pub list: bool,
    pub dry_run: bool,
    pub disk_size: Option<DiskSize>,
    pub cloud_init: Option<PathBuf>,
    /// Passed to `virt-install` verbatim.
    pub extra_args: Vec<String>,
}

/// Everything decided before the first external command runs.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub name: String,
    pub template: TemplateCandidate,
    pub image: PathBuf,
    pub seed: StagedSeed,
    pub clone: ExternalCommand,
    pub install: ExternalCommand,
}

impl CreatePlan {
    /// Whether `--osinfo` still has to be detected and appended.
    pub fn needs_osinfo(&self) -> bool {
        !self.install.has_flag(OS_FLAGS)
    }
}

/// What `create` does for a given inventory: list templates or create one.
#[derive(Debug)]
pub enum Outcome {
    Listing(String),
    Create(Box<CreatePlan>),
}

pub fn plan(
    backend: &impl Backend,
    settings: &Settings,
    opts: &CreateOptions,
) -> Result<Outcome, VmmgrError> {
    let pattern = match (&opts.pattern, opts.list) {
        (_, true) => None,
        (Some(p), false) => Some(p.as_str()),
        (None, false) => {
            return Err(VmmgrError::Validation {
                message: "a template pattern is required (or use --list)".into(),
            });
        }
    };

    let pools = backend.pools()?;
    let found = backend::template_candidates(&pools, settings);

    let Some(pattern) = pattern else {
        let shown = template::filter(&found.candidates, opts.pattern.as_deref());
        return Ok(Outcome::Listing(template::render_list(&shown)));
    };

    let template = template::resolve(pattern, &found)?;
    let pool = backend::working_pool(&pools, settings)?;
    let domains = backend.domains()?;

    let taken = backend::taken_names(&domains, pool);
    let name = naming::next_name(&naming::base_name(&template.name, pattern), &taken);
    let image = paths::instance_image(&pool.path, &name);
    tracing::debug!(%name, image = %image.display(), template = %template, "planned instance");

    let user_data = cloudinit::locate(
        opts.cloud_init.as_deref(),
        template.dir(),
        &pool.path,
        &settings.ssh_dir,
    )?;
    // A dry run stages generated user-data but leaves the pool untouched.
    if !opts.dry_run {
        user_data.persist()?;
    }
    let seed = cloudinit::stage(&settings.runtime_dir, &name, &user_data)?;

    let mut clone = ExternalCommand::new("qemu-img")
        .args(["create", "-f", "qcow2", "-b"])
        .arg(template.path.display().to_string())
        .args(["-F", "qcow2"])
        .arg(image.display().to_string());
    if let Some(size) = &opts.disk_size {
        clone = clone.arg(size.to_string());
    }

    let vm = &settings.vm;
    let install = ExternalCommand::new("virt-install")
        .args(["--name", name.as_str()])
        .args(["--memory".to_string(), vm.memory_mb.to_string()])
        .args(["--vcpus".to_string(), vm.vcpus.to_string()])
        .args(["--disk".to_string(), image.display().to_string()])
        .arg("--import")
        .args(["--network", vm.network.as_str()])
        .args(["--cloud-init".to_string(), seed.virt_install_arg()])
        .arg("--noautoconsole")
        .args(opts.extra_args.iter().cloned());

    Ok(Outcome::Create(Box::new(CreatePlan {
        name,
        template,
        image,
        seed,
        clone,
        install,
    })))
}

/// Clone the image, detect the OS variant if needed, run `virt-install`.
///
/// A failing `virt-install` leaves the cloned image in the pool.
pub async fn execute(plan: CreatePlan, runner: Runner) -> Result<(), VmmgrError> {
    runner.run(&plan.clone).await?;

    let needs_osinfo = plan.needs_osinfo();
    let mut install = plan.install;
    if needs_osinfo {
        let variant = osinfo::detect(&plan.template.path, runner.dry_run).await?;
        install = install.args(["--osinfo".to_string(), variant]);
    }
    runner.run(&install).await?;

    tracing::info!(name = %plan.name, "instance created");
    Ok(())
}

pub async fn run(
    backend: &impl Backend,
    settings: &Settings,
    opts: CreateOptions,
) -> Result<(), VmmgrError> {
    match plan(backend, settings, &opts)? {
        Outcome::Listing(text) => {
            print!("{text}");
            Ok(())
        }
        Outcome::Create(plan) => execute(*plan, Runner::new(opts.dry_run)).await,
    }
}
