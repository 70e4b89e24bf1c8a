use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::VmmgrError;
use crate::paths;

pub const DEFAULT_POOL: &str = "vmmgr";
pub const DEFAULT_TEMPLATE_POOLS: &str = "default";

// ── config file model ─────────────────────────────────────

/// Optional `~/.config/vmmgr/config.toml`.
#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct FileConfig {
    pub pool: Option<String>,
    pub template_pools: Option<Vec<String>>,
    #[facet(default)]
    pub vm: VmConfig,
    #[facet(default)]
    pub users: UsersConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct VmConfig {
    #[facet(default = 2048)]
    pub memory_mb: u64,
    #[facet(default = 2)]
    pub vcpus: u32,
    #[facet(default = "bridge=virbr0")]
    pub network: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_mb: 2048,
            vcpus: 2,
            network: "bridge=virbr0".into(),
        }
    }
}

/// Login user lookup tables. Entries from the file are layered over the
/// built-in ones.
#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct UsersConfig {
    #[facet(default)]
    pub templates: BTreeMap<String, String>,
    #[facet(default)]
    pub os: BTreeMap<String, String>,
}

// ── Settings ──────────────────────────────────────────────

/// Values coming from flags or their environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub pool: Option<String>,
    pub template_pools: Option<String>,
    pub runtime_dir: Option<PathBuf>,
}

/// Resolved configuration, built once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Working pool: the namespace of instances this tool created.
    pub pool: String,
    /// Pools searched for template images.
    pub template_pools: Vec<String>,
    /// Where per-instance cloud-init seed files are staged.
    pub runtime_dir: PathBuf,
    /// Directory holding the user's SSH keys.
    pub ssh_dir: PathBuf,
    pub vm: VmConfig,
    pub users: UsersConfig,
}

impl Settings {
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self, VmmgrError> {
        let pool = overrides
            .pool
            .or(file.pool)
            .unwrap_or_else(|| DEFAULT_POOL.to_string());
        if pool.trim().is_empty() {
            return Err(VmmgrError::Validation {
                message: "working pool name must not be empty".into(),
            });
        }

        let template_pools = match (overrides.template_pools, file.template_pools) {
            (Some(list), _) => split_pool_list(&list),
            (None, Some(list)) => list
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            (None, None) => split_pool_list(DEFAULT_TEMPLATE_POOLS),
        };
        if template_pools.is_empty() {
            return Err(VmmgrError::Validation {
                message: "at least one template pool is required".into(),
            });
        }

        let mut users = default_users();
        users.templates.extend(file.users.templates);
        users.os.extend(file.users.os);

        Ok(Self {
            pool,
            template_pools,
            runtime_dir: overrides.runtime_dir.unwrap_or_else(paths::runtime_dir),
            ssh_dir: paths::ssh_dir(),
            vm: file.vm,
            users,
        })
    }

    /// Load the config file (if any) and merge it with the overrides.
    pub fn load(overrides: Overrides) -> Result<Self, VmmgrError> {
        let file = match &overrides.config {
            Some(path) => load_file(path)?,
            None => {
                let path = paths::config_file();
                if path.exists() {
                    load_file(&path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::resolve(overrides, file)
    }
}

/// Split a comma-separated pool list, trimming blanks.
pub fn split_pool_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn default_users() -> UsersConfig {
    let templates = [("dsc", "dscci"), ("fedora", "fedora"), ("rhel", "cloud-user")];
    let os = [
        ("fedora", "fedora"),
        ("rhel", "cloud-user"),
        ("centos", "cloud-user"),
        ("almalinux", "almalinux"),
        ("rocky", "rocky"),
        ("ubuntu", "ubuntu"),
        ("debian", "debian"),
    ];
    UsersConfig {
        templates: templates
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        os: os
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

pub fn load_file(path: &Path) -> Result<FileConfig, VmmgrError> {
    let contents = std::fs::read_to_string(path).map_err(|source| VmmgrError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    facet_toml::from_str(&contents).map_err(|e| VmmgrError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
