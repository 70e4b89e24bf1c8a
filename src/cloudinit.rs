//! Cloud-init seed lookup and staging.
//!
//! A new instance gets its `user-data` from the first existing of:
//! an explicit file, `<template dir>/cloud-init/user-data`,
//! `<working pool>/cloud-init/user-data`. When none exists one is generated
//! from the public keys in `~/.ssh`; once persisted to the working pool the
//! next run finds it there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::VmmgrError;
use crate::paths;

/// User-data picked for a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserData {
    /// An existing file.
    File(PathBuf),
    /// Built from public keys, destined for `path` in the working pool.
    Generated { path: PathBuf, content: String },
}

impl UserData {
    pub fn path(&self) -> &Path {
        match self {
            UserData::File(path) | UserData::Generated { path, .. } => path,
        }
    }

    /// Write generated user-data to the working pool. Existing files are left alone.
    pub fn persist(&self) -> Result<(), VmmgrError> {
        let UserData::Generated { path, content } = self else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VmmgrError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
        }
        fs::write(path, content).map_err(|e| VmmgrError::Io {
            context: format!("writing cloud-init user-data to {}", path.display()),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "generated cloud-init user-data");
        Ok(())
    }

    fn contents(&self) -> Result<Vec<u8>, VmmgrError> {
        match self {
            UserData::File(path) => {
                fs::read(path).map_err(|source| VmmgrError::CloudInitNotFound {
                    path: path.display().to_string(),
                    source,
                })
            }
            UserData::Generated { content, .. } => Ok(content.clone().into_bytes()),
        }
    }
}

/// Find the user-data for a new instance, generating it when no file exists.
///
/// Nothing is written; call [`UserData::persist`] to keep generated content.
pub fn locate(
    explicit: Option<&Path>,
    source_image_dir: &Path,
    pool_root_dir: &Path,
    ssh_public_key_dir: &Path,
) -> Result<UserData, VmmgrError> {
    if let Some(path) = explicit {
        check_readable(path).map_err(|source| VmmgrError::CloudInitNotFound {
            path: path.display().to_string(),
            source,
        })?;
        return Ok(UserData::File(path.to_path_buf()));
    }

    for dir in [source_image_dir, pool_root_dir] {
        let candidate = paths::user_data_in(dir);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "found cloud-init user-data");
            return Ok(UserData::File(candidate));
        }
    }

    let keys = read_public_keys(ssh_public_key_dir)?;
    tracing::debug!(keys = keys.len(), "building cloud-init user-data from public keys");
    Ok(UserData::Generated {
        path: paths::user_data_in(pool_root_dir),
        content: build_user_data(&keys),
    })
}

/// Open the file to make sure it is a readable regular file.
fn check_readable(path: &Path) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    fs::File::open(path).map(|_| ())
}

/// Contents of every `*.pub` file directly in `dir`, trimmed, ordered by file name.
pub fn read_public_keys(dir: &Path) -> Result<Vec<String>, VmmgrError> {
    let no_keys = || VmmgrError::NoSSHKeysFound {
        dir: dir.display().to_string(),
    };

    let Ok(entries) = fs::read_dir(dir) else {
        return Err(no_keys());
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pub") && p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(no_keys());
    }

    let mut keys = Vec::with_capacity(files.len());
    for file in &files {
        let raw = fs::read_to_string(file).map_err(|e| VmmgrError::Io {
            context: format!("reading SSH public key {}", file.display()),
            source: e,
        })?;
        let key = raw.trim().to_string();
        match ssh_key::PublicKey::from_openssh(&key) {
            Ok(parsed) => tracing::debug!(
                file = %file.display(),
                algorithm = %parsed.algorithm(),
                fingerprint = %parsed.fingerprint(ssh_key::HashAlg::Sha256),
                "adding SSH public key"
            ),
            Err(e) => tracing::warn!(
                file = %file.display(),
                "file does not look like an OpenSSH public key ({e}), adding it anyway"
            ),
        }
        keys.push(key);
    }
    Ok(keys)
}

#[derive(Facet)]
struct KeyOnlyConfig {
    allow_public_ssh_keys: bool,
    ssh_authorized_keys: Vec<String>,
}

/// Minimal `#cloud-config` granting access with the given public keys.
pub fn build_user_data(keys: &[String]) -> String {
    let config = KeyOnlyConfig {
        allow_public_ssh_keys: true,
        ssh_authorized_keys: keys.to_vec(),
    };
    let yaml = facet_yaml::to_string(&config).expect("valid YAML serialization");
    // cloud-init wants `#cloud-config` as the very first line, no document separator.
    let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
    format!("#cloud-config\n{yaml}")
}

/// NoCloud meta-data for an instance.
pub fn build_meta_data(vm_name: &str) -> String {
    format!("local-hostname: '{vm_name}'\n")
}

/// Seed files staged in the runtime directory for `virt-install --cloud-init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSeed {
    pub user_data: PathBuf,
    pub meta_data: PathBuf,
}

impl StagedSeed {
    pub fn paths_for(runtime_dir: &Path, vm_name: &str) -> Self {
        Self {
            user_data: paths::staged_user_data(runtime_dir, vm_name),
            meta_data: paths::staged_meta_data(runtime_dir, vm_name),
        }
    }

    /// Value of `virt-install --cloud-init`.
    pub fn virt_install_arg(&self) -> String {
        format!(
            "user-data={},meta-data={}",
            self.user_data.display(),
            self.meta_data.display()
        )
    }
}

/// Copy `user_data` into the runtime dir and write meta-data next to it.
pub fn stage(
    runtime_dir: &Path,
    vm_name: &str,
    user_data: &UserData,
) -> Result<StagedSeed, VmmgrError> {
    let staged = StagedSeed::paths_for(runtime_dir, vm_name);
    let content = user_data.contents()?;

    fs::create_dir_all(runtime_dir).map_err(|e| VmmgrError::Io {
        context: format!("creating runtime directory {}", runtime_dir.display()),
        source: e,
    })?;
    fs::write(&staged.user_data, content).map_err(|e| VmmgrError::Io {
        context: format!("writing {}", staged.user_data.display()),
        source: e,
    })?;
    fs::write(&staged.meta_data, build_meta_data(vm_name)).map_err(|e| VmmgrError::Io {
        context: format!("writing {}", staged.meta_data.display()),
        source: e,
    })?;

    tracing::debug!(
        user_data = %staged.user_data.display(),
        meta_data = %staged.meta_data.display(),
        "staged cloud-init seed"
    );
    Ok(staged)
}
