//! Renderings of managed instances for `vmmgr list`.

use std::path::Path;

use crate::backend::DomainInfo;
use crate::cli::ListFormat;
use crate::config::UsersConfig;

/// Private keys offered to ansible, in preference order.
const SSH_PRIVATE_KEYS: &[&str] = &["id_ecdsa", "id_ecdsa_sk", "id_ed25519", "id_ed25519_sk", "id_rsa"];

const NO_KEY: &str = "NO_KEY";

/// Login user for an instance: the name's first `-` component in the
/// template map, else its OS id in the OS map, else empty.
pub fn determine_user(domain: &DomainInfo, users: &UsersConfig) -> String {
    let prefix = domain.name.split('-').next().unwrap_or_default();
    if let Some(user) = users.templates.get(prefix) {
        return user.clone();
    }
    domain
        .os_id
        .as_ref()
        .and_then(|os| users.os.get(os))
        .cloned()
        .unwrap_or_default()
}

/// First private key present in `ssh_dir`.
pub fn ssh_private_key(ssh_dir: &Path) -> Option<String> {
    SSH_PRIVATE_KEYS
        .iter()
        .map(|k| ssh_dir.join(k))
        .find(|p| p.exists())
        .map(|p| p.display().to_string())
}

pub fn render(
    format: ListFormat,
    domains: &[DomainInfo],
    users: &UsersConfig,
    ssh_dir: &Path,
) -> String {
    match format {
        ListFormat::Table => table(domains, users),
        ListFormat::Shell => shell(domains, users),
        ListFormat::Ansible => {
            let key = ssh_private_key(ssh_dir).unwrap_or_else(|| NO_KEY.to_string());
            ansible(domains, users, &key)
        }
        ListFormat::Json => json(domains, users),
    }
}

pub fn table(domains: &[DomainInfo], users: &UsersConfig) -> String {
    let header = format!("{:<30} {:<15} {:<28} {:<10}", "NAME", "STATE", "IP ADDRESS", "USER");
    let rule = "-".repeat(header.len());
    let mut lines = vec![header, rule];
    for d in domains {
        lines.push(format!(
            "{:<30} {:<15} {:<28} {:<10}",
            d.name,
            d.state.label(),
            d.ip_address.as_deref().unwrap_or(""),
            determine_user(d, users),
        ));
    }
    lines.join("\n")
}

pub fn shell(domains: &[DomainInfo], users: &UsersConfig) -> String {
    let mut lines = Vec::new();
    for d in domains {
        lines.push(format!("VM_NAME={}    # {}", d.name, d.state));
        lines.push(format!("VM_USER={}", determine_user(d, users)));
        lines.push(format!("IP_ADDR={}", d.ip_address.as_deref().unwrap_or("")));
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Inventory lines; instances that are not running are commented out.
pub fn ansible(domains: &[DomainInfo], users: &UsersConfig, key: &str) -> String {
    domains
        .iter()
        .map(|d| {
            let comment = if d.state.is_running() { "" } else { "# " };
            format!(
                "{comment}{} ansible_host={} ansible_ssh_private_key_file={key} ansible_user={}",
                d.name,
                d.ip_address.as_deref().unwrap_or(""),
                determine_user(d, users),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(facet::Facet)]
struct InstanceJson {
    name: String,
    uuid: String,
    state: String,
    ip_address: Option<String>,
    user: String,
    os_id: Option<String>,
    os_version_id: Option<String>,
    disks: Vec<String>,
}

pub fn json(domains: &[DomainInfo], users: &UsersConfig) -> String {
    let items: Vec<InstanceJson> = domains
        .iter()
        .map(|d| InstanceJson {
            name: d.name.clone(),
            uuid: d.uuid.clone(),
            state: d.state.label().to_string(),
            ip_address: d.ip_address.clone(),
            user: determine_user(d, users),
            os_id: d.os_id.clone(),
            os_version_id: d.os_version_id.clone(),
            disks: d.disks.iter().map(|p| p.display().to_string()).collect(),
        })
        .collect();
    facet_json::to_string(&items).expect("JSON serialization")
}
