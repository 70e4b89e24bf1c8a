use std::path::PathBuf;

use virt::connect::Connect;
use virt::domain::Domain;
use virt::error as virt_error;
use virt::storage_pool::StoragePool;

use crate::backend::{Backend, DomainInfo, GuestAddress, PoolInfo, pick_address};
use crate::domain_xml;
use crate::error::VmmgrError;
use crate::pool_xml;
use crate::template;
use crate::vm_state::DomainState;

struct ConnGuard(Connect);

impl std::ops::Deref for ConnGuard {
    type Target = Connect;
    fn deref(&self) -> &Connect {
        &self.0
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.close().ok();
    }
}

/// Inventory read through the libvirt client library.
pub struct LibvirtBackend {
    /// `None` uses libvirt's default URI (`LIBVIRT_DEFAULT_URI`, then the
    /// per-user default), the same connection `virsh` and `virt-install` pick.
    uri: Option<String>,
}

impl LibvirtBackend {
    pub fn new(uri: Option<String>) -> Self {
        Self { uri }
    }

    fn connect(&self) -> Result<ConnGuard, VmmgrError> {
        // Errors are reported through Result; keep libvirt from printing them too.
        virt_error::clear_error_callback();

        Connect::open(self.uri.as_deref())
            .map(ConnGuard)
            .map_err(|e| VmmgrError::Libvirt {
                message: format!("failed to connect to libvirt: {e}"),
                hint: "ensure libvirtd (or virtqemud) is running and you have access to it".into(),
            })
    }
}

impl Backend for LibvirtBackend {
    fn pools(&self) -> Result<Vec<PoolInfo>, VmmgrError> {
        let conn = self.connect()?;
        let pools = conn
            .list_all_storage_pools(0)
            .map_err(|e| VmmgrError::Libvirt {
                message: format!("failed to list storage pools: {e}"),
                hint: "check `virsh pool-list --all`".into(),
            })?;

        let mut out = Vec::with_capacity(pools.len());
        for pool in &pools {
            let Ok(name) = pool.get_name() else {
                continue;
            };
            let path = match pool.get_xml_desc(0) {
                Ok(xml) => match pool_xml::pool_path(&xml) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::debug!(pool = %name, "skipping pool: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    tracing::debug!(pool = %name, "skipping pool, no XML: {e}");
                    continue;
                }
            };
            out.push(PoolInfo {
                uuid: pool.get_uuid_string().unwrap_or_default(),
                volumes: image_volumes(pool, &name),
                name,
                path,
            });
        }

        tracing::debug!(count = out.len(), "enumerated storage pools");
        Ok(out)
    }

    fn domains(&self) -> Result<Vec<DomainInfo>, VmmgrError> {
        let conn = self.connect()?;
        let flags = virt::sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE
            | virt::sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;
        let domains = conn.list_all_domains(flags).map_err(|e| VmmgrError::Libvirt {
            message: format!("failed to list domains: {e}"),
            hint: "check `virsh list --all`".into(),
        })?;

        let mut out = Vec::with_capacity(domains.len());
        for dom in &domains {
            match domain_info(dom) {
                Ok(info) => out.push(info),
                Err(e) => tracing::warn!("skipping domain: {e}"),
            }
        }

        tracing::debug!(count = out.len(), "enumerated domains");
        Ok(out)
    }
}

/// Image volumes of a pool; an inactive or unreadable pool has none.
fn image_volumes(pool: &StoragePool, name: &str) -> Vec<PathBuf> {
    let vols = match pool.list_all_volumes(0) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(pool = %name, "cannot list volumes: {e}");
            return Vec::new();
        }
    };
    vols.iter()
        .filter_map(|v| v.get_path().ok())
        .map(PathBuf::from)
        .filter(|p| template::is_image(p))
        .collect()
}

fn domain_info(dom: &Domain) -> Result<DomainInfo, VmmgrError> {
    let libvirt_err = |what: &str, e: virt_error::Error| VmmgrError::Libvirt {
        message: format!("{what}: {e}"),
        hint: "the domain may have been removed while listing".into(),
    };

    let name = dom.get_name().map_err(|e| libvirt_err("reading domain name", e))?;
    let uuid = dom.get_uuid_string().unwrap_or_default();
    let (raw_state, _reason) = dom
        .get_state()
        .map_err(|e| libvirt_err("reading domain state", e))?;
    let state = DomainState::from_raw(raw_state as u32);
    let xml = dom
        .get_xml_desc(0)
        .map_err(|e| libvirt_err("reading domain XML", e))?;
    let facts = domain_xml::parse(&xml)?;

    let ip_address = if state.is_running() {
        guest_address(dom, facts.agent_connected)
    } else {
        None
    };

    Ok(DomainInfo {
        name,
        uuid,
        state,
        disks: facts.disks,
        ip_address,
        os_id: facts.os_id,
        os_version_id: facts.os_version_id,
    })
}

/// Ask the guest agent first (when its channel is up), then DHCP leases, then ARP.
fn guest_address(dom: &Domain, agent_connected: bool) -> Option<String> {
    let mut sources = Vec::new();
    if agent_connected {
        sources.push(virt::sys::VIR_DOMAIN_INTERFACE_ADDRESSES_SRC_AGENT);
    }
    sources.push(virt::sys::VIR_DOMAIN_INTERFACE_ADDRESSES_SRC_LEASE);
    sources.push(virt::sys::VIR_DOMAIN_INTERFACE_ADDRESSES_SRC_ARP);

    for source in sources {
        let Ok(ifaces) = dom.interface_addresses(source, 0) else {
            continue;
        };
        let addrs: Vec<GuestAddress> = ifaces
            .iter()
            .flat_map(|iface| {
                iface.addrs.iter().map(|a| GuestAddress {
                    interface: iface.name.clone(),
                    addr: a.addr.clone(),
                    ipv4: a.typed == virt::sys::VIR_IP_ADDR_TYPE_IPV4 as i64,
                })
            })
            .collect();
        if let Some(ip) = pick_address(&addrs) {
            return Some(ip);
        }
    }
    None
}
