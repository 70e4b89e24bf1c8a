use std::path::{Path, PathBuf};

/// Runtime directory for staged seed files: `$XDG_RUNTIME_DIR` or `/run/user/<uid>`.
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(|| {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}"))
    })
}

/// `~/.ssh`
pub fn ssh_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".ssh")
}

/// Default config file: `~/.config/vmmgr/config.toml`
pub fn config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vmmgr")
        .join("config.toml")
}

/// `<dir>/cloud-init/user-data`
pub fn user_data_in(dir: &Path) -> PathBuf {
    dir.join("cloud-init").join("user-data")
}

/// Staged user-data handed to virt-install.
pub fn staged_user_data(runtime_dir: &Path, vm_name: &str) -> PathBuf {
    runtime_dir.join(format!("vmmgr-{vm_name}-user-data"))
}

/// Staged meta-data handed to virt-install.
pub fn staged_meta_data(runtime_dir: &Path, vm_name: &str) -> PathBuf {
    runtime_dir.join(format!("vmmgr-{vm_name}-meta-data"))
}

/// Disk image of a new instance inside the working pool.
pub fn instance_image(pool_root: &Path, vm_name: &str) -> PathBuf {
    pool_root.join(format!("{vm_name}.qcow2"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_seed_names() {
        let run = Path::new("/run/user/1000");
        assert_eq!(
            staged_user_data(run, "plucky-1"),
            PathBuf::from("/run/user/1000/vmmgr-plucky-1-user-data")
        );
        assert_eq!(
            staged_meta_data(run, "plucky-1"),
            PathBuf::from("/run/user/1000/vmmgr-plucky-1-meta-data")
        );
    }

    #[test]
    fn instance_image_is_qcow2_in_pool() {
        assert_eq!(
            instance_image(Path::new("/var/lib/vmmgr"), "fedora-42-1"),
            PathBuf::from("/var/lib/vmmgr/fedora-42-1.qcow2")
        );
    }
}
