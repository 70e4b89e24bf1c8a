//! Inventory boundary. Everything above this module works on plain
//! snapshots; only `libvirt` talks to the daemon.

pub mod libvirt;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::VmmgrError;
use crate::template::{self, TemplateCandidate, TemplateSearch};
use crate::vm_state::DomainState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
    pub name: String,
    pub uuid: String,
    pub path: PathBuf,
    /// Paths of the pool's image volumes (`.qcow2`, `.img`).
    pub volumes: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub name: String,
    pub uuid: String,
    pub state: DomainState,
    pub disks: Vec<PathBuf>,
    pub ip_address: Option<String>,
    pub os_id: Option<String>,
    pub os_version_id: Option<String>,
}

/// One address reported for a guest interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAddress {
    pub interface: String,
    pub addr: String,
    pub ipv4: bool,
}

/// Loopback is skipped and IPv4 preferred; otherwise first reported wins.
pub fn pick_address(addrs: &[GuestAddress]) -> Option<String> {
    let usable = || addrs.iter().filter(|a| a.interface != "lo");
    usable()
        .find(|a| a.ipv4)
        .or_else(|| usable().next())
        .map(|a| a.addr.clone())
}

pub trait Backend {
    /// Storage pools with a target path, and their image volumes.
    fn pools(&self) -> Result<Vec<PoolInfo>, VmmgrError>;
    /// Every defined domain.
    fn domains(&self) -> Result<Vec<DomainInfo>, VmmgrError>;
}

pub fn create_backend() -> libvirt::LibvirtBackend {
    libvirt::LibvirtBackend::new(None)
}

// ── snapshot queries ───────────────────────────────────────

/// Template images in the configured template pools, in pool order.
pub fn template_candidates(pools: &[PoolInfo], settings: &Settings) -> TemplateSearch {
    let mut out = TemplateSearch::default();
    for wanted in &settings.template_pools {
        let Some(pool) = pools.iter().find(|p| &p.name == wanted) else {
            tracing::warn!(pool = %wanted, "template pool not found");
            out.missing.push(wanted.clone());
            continue;
        };
        out.searched.push(pool.name.clone());
        out.candidates.extend(
            pool.volumes
                .iter()
                .map(|v| TemplateCandidate::new(&pool.name, v.clone())),
        );
    }
    out
}

pub fn working_pool<'a>(
    pools: &'a [PoolInfo],
    settings: &Settings,
) -> Result<&'a PoolInfo, VmmgrError> {
    pools
        .iter()
        .find(|p| p.name == settings.pool)
        .ok_or_else(|| VmmgrError::PoolNotFound {
            name: settings.pool.clone(),
        })
}

/// Disks of `domain` that are images inside `pool_root`.
pub fn disks_in_pool<'a>(domain: &'a DomainInfo, pool_root: &Path) -> Vec<&'a PathBuf> {
    domain
        .disks
        .iter()
        .filter(|d| d.starts_with(pool_root) && template::is_image(d))
        .collect()
}

/// Domains with at least one image disk inside the working pool.
pub fn managed_domains(domains: Vec<DomainInfo>, pool: &PoolInfo) -> Vec<DomainInfo> {
    domains
        .into_iter()
        .filter(|d| !disks_in_pool(d, &pool.path).is_empty())
        .collect()
}

/// Names a new instance must not take: every domain name plus the stem of
/// every volume in the working pool.
pub fn taken_names(domains: &[DomainInfo], pool: &PoolInfo) -> HashSet<String> {
    let mut names: HashSet<String> = domains.iter().map(|d| d.name.clone()).collect();
    names.extend(
        pool.volumes
            .iter()
            .filter_map(|v| v.file_stem())
            .map(|s| s.to_string_lossy().into_owned()),
    );
    names
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cell::Cell;

    /// In-memory inventory for exercising commands without libvirt.
    pub struct FakeBackend {
        pub pools: Vec<PoolInfo>,
        pub domains: Vec<DomainInfo>,
        pub domain_queries: Cell<usize>,
    }

    impl FakeBackend {
        pub fn new(pools: Vec<PoolInfo>, domains: Vec<DomainInfo>) -> Self {
            Self {
                pools,
                domains,
                domain_queries: Cell::new(0),
            }
        }
    }

    impl Backend for FakeBackend {
        fn pools(&self) -> Result<Vec<PoolInfo>, VmmgrError> {
            Ok(self.pools.clone())
        }

        fn domains(&self) -> Result<Vec<DomainInfo>, VmmgrError> {
            self.domain_queries.set(self.domain_queries.get() + 1);
            Ok(self.domains.clone())
        }
    }

    pub fn pool(name: &str, path: &str, volumes: &[&str]) -> PoolInfo {
        PoolInfo {
            name: name.into(),
            uuid: format!("uuid-{name}"),
            path: PathBuf::from(path),
            volumes: volumes
                .iter()
                .map(|v| Path::new(path).join(v))
                .collect(),
        }
    }

    pub fn domain(name: &str, state: DomainState, disks: &[&str]) -> DomainInfo {
        DomainInfo {
            name: name.into(),
            uuid: format!("uuid-{name}"),
            state,
            disks: disks.iter().map(PathBuf::from).collect(),
            ip_address: None,
            os_id: None,
            os_version_id: None,
        }
    }

    fn settings() -> Settings {
        crate::config::tests::test_settings(Path::new("/tmp/vmmgr-test"))
    }

    fn addr(interface: &str, addr: &str, ipv4: bool) -> GuestAddress {
        GuestAddress {
            interface: interface.into(),
            addr: addr.into(),
            ipv4,
        }
    }

    #[test]
    fn no_addresses() {
        assert_eq!(pick_address(&[]), None);
    }

    #[test]
    fn loopback_only() {
        assert_eq!(pick_address(&[addr("lo", "127.0.0.1", true)]), None);
    }

    #[test]
    fn ipv6_when_nothing_else() {
        let addrs = [
            addr("lo", "::1", false),
            addr("eth0", "fe80::32aa:6994:4e0b:d439", false),
        ];
        assert_eq!(
            pick_address(&addrs).as_deref(),
            Some("fe80::32aa:6994:4e0b:d439")
        );
    }

    #[test]
    fn prefers_ipv4() {
        let addrs = [
            addr("lo", "127.0.0.1", true),
            addr("lo", "::1", false),
            addr("eth0", "fe80::32aa:6994:4e0b:d439", false),
            addr("eth0", "192.168.122.225", true),
        ];
        assert_eq!(pick_address(&addrs).as_deref(), Some("192.168.122.225"));
    }

    #[test]
    fn candidates_only_from_template_pools() {
        let pools = vec![
            pool("default", "/var/lib/libvirt/images", &["fedora-42.qcow2"]),
            pool("vmmgr", "/var/lib/vmmgr", &["fedora-42-1.qcow2"]),
        ];
        let found = template_candidates(&pools, &settings());
        let c = &found.candidates;
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].name, "fedora-42.qcow2");
        assert_eq!(c[0].pool, "default");
        assert_eq!(found.searched, vec!["default".to_string()]);
        assert!(found.missing.is_empty());
    }

    #[test]
    fn absent_template_pool_is_reported_missing() {
        let pools = vec![pool("images", "/srv/images", &["debian-12.qcow2"])];
        let mut s = settings();
        s.template_pools = vec!["default".into(), "images".into()];
        let found = template_candidates(&pools, &s);
        assert_eq!(found.searched, vec!["images".to_string()]);
        assert_eq!(found.missing, vec!["default".to_string()]);
        assert_eq!(found.candidates.len(), 1);
    }

    #[test]
    fn missing_working_pool() {
        let pools = vec![pool("default", "/var/lib/libvirt/images", &[])];
        let err = working_pool(&pools, &settings()).unwrap_err();
        assert!(matches!(err, VmmgrError::PoolNotFound { .. }));
        assert!(err.to_string().contains("'vmmgr'"));
    }

    #[test]
    fn managed_by_disk_location() {
        let wp = pool("vmmgr", "/var/lib/vmmgr", &["a-1.qcow2"]);
        let domains = vec![
            domain("a-1", DomainState::Running, &["/var/lib/vmmgr/a-1.qcow2"]),
            domain("other", DomainState::Running, &["/var/lib/libvirt/images/other.qcow2"]),
            domain("seeded", DomainState::Shutoff, &["/var/lib/vmmgr/seed.iso"]),
            domain("fresh", DomainState::Shutoff, &["/var/lib/vmmgr/fresh-1.qcow2"]),
        ];
        let managed: Vec<_> = managed_domains(domains, &wp)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(managed, vec!["a-1".to_string(), "fresh".to_string()]);
    }

    #[test]
    fn taken_names_include_domains_and_volumes() {
        let wp = pool("vmmgr", "/var/lib/vmmgr", &["plucky-2.qcow2"]);
        let domains = vec![domain("plucky-1", DomainState::Running, &[])];
        let taken = taken_names(&domains, &wp);
        assert!(taken.contains("plucky-1"));
        assert!(taken.contains("plucky-2"));
        assert_eq!(crate::naming::next_name("plucky", &taken), "plucky-3");
    }
}
