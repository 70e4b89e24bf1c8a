//! Instance naming: `<base>-<N>` with the smallest free `N`.

use std::collections::HashSet;

use crate::template::strip_image_extension;

/// Derive the base instance name from a template file name and the pattern
/// that selected it.
///
/// The name is cut at the first `-` at or after the end of the pattern, so
/// `fedora-41` on `fedora-41-x86_64-kvm.qcow2` gives `fedora-41` and `rhel-8`
/// on `rhel-8.10-x86_64-kvm.qcow2` gives `rhel-8.10`. Without such a dash the
/// whole name minus its image extension is used.
pub fn base_name(template_name: &str, pattern: &str) -> String {
    let stem = strip_image_extension(template_name);
    let from = pattern.len().min(stem.len());
    match stem.get(from..).and_then(|rest| rest.find('-')) {
        Some(offset) if from + offset > 0 => stem[..from + offset].to_string(),
        _ => stem.to_string(),
    }
}

/// First `base-N` (N = 1, 2, ...) not present in `existing`.
pub fn next_name(base: &str, existing: &HashSet<String>) -> String {
    let mut n: u64 = 1;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
