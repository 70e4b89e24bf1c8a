//! Template discovery: pick exactly one template image from the snapshot
//! the backend enumerated.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::VmmgrError;

/// File extensions that mark a volume as a disk image.
pub const IMAGE_EXTENSIONS: &[&str] = &["qcow2", "img"];

/// A template image found in one of the template pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateCandidate {
    /// Volume file name, e.g. `fedora-42-x86_64-kvm.qcow2`.
    pub name: String,
    /// Pool the volume was found in.
    pub pool: String,
    /// Full path of the volume on the host.
    pub path: PathBuf,
}

impl TemplateCandidate {
    pub fn new(pool: &str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            pool: pool.to_string(),
            path,
        }
    }

    /// Directory holding the image file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }
}

impl fmt::Display for TemplateCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pool, self.name)
    }
}

/// Template images gathered from the configured template pools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSearch {
    pub candidates: Vec<TemplateCandidate>,
    /// Configured pools that exist, in configured order.
    pub searched: Vec<String>,
    /// Configured pools libvirt does not know.
    pub missing: Vec<String>,
}

/// Whether `path` has one of the recognized image extensions (case-insensitive).
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Strip a trailing recognized image extension: `a.qcow2` → `a`, `a.iso` → `a.iso`.
pub fn strip_image_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known)) =>
        {
            stem
        }
        _ => name,
    }
}

/// Whether a template name matches a user pattern (prefix of the extension-less name).
pub fn matches(name: &str, pattern: &str) -> bool {
    strip_image_extension(name).starts_with(pattern)
}

/// Candidates matching `pattern` (all of them when `pattern` is `None`),
/// sorted by name for display.
pub fn filter<'a>(
    candidates: &'a [TemplateCandidate],
    pattern: Option<&str>,
) -> Vec<&'a TemplateCandidate> {
    let mut out: Vec<_> = candidates
        .iter()
        .filter(|c| pattern.is_none_or(|p| matches(&c.name, p)))
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.pool.cmp(&b.pool)));
    out
}

/// Select the single template matching `pattern`.
pub fn resolve(pattern: &str, search: &TemplateSearch) -> Result<TemplateCandidate, VmmgrError> {
    if pattern.is_empty() {
        return Err(VmmgrError::Validation {
            message: "template pattern must not be empty".into(),
        });
    }

    let found: Vec<&TemplateCandidate> = search
        .candidates
        .iter()
        .filter(|c| matches(&c.name, pattern))
        .collect();

    match found.as_slice() {
        [] => Err(VmmgrError::NoMatch {
            pattern: pattern.to_string(),
            pools: if search.searched.is_empty() {
                "(none)".to_string()
            } else {
                search.searched.join(", ")
            },
            missing: search.missing.clone(),
        }),
        [one] => {
            tracing::debug!(template = %one, "resolved template");
            Ok((*one).clone())
        }
        many => Err(VmmgrError::AmbiguousMatch {
            pattern: pattern.to_string(),
            matches: many.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

/// Render the `create --list` report.
pub fn render_list(candidates: &[&TemplateCandidate]) -> String {
    let mut out = String::from("Available VM template images:\n");
    for c in candidates {
        out.push_str(&format!(" {}\n", c.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(names: &[&str]) -> Vec<TemplateCandidate> {
        names
            .iter()
            .map(|n| TemplateCandidate::new("default", format!("/var/lib/libvirt/images/{n}")))
            .collect()
    }

    /// `candidates` as found by searching the `default` and `images` pools.
    fn search(candidates: Vec<TemplateCandidate>) -> TemplateSearch {
        TemplateSearch {
            candidates,
            searched: vec!["default".into(), "images".into()],
            missing: vec![],
        }
    }

    #[test]
    fn resolves_unique_prefix() {
        let c = candidates(&[
            "fedora-42-x86_64-kvm.qcow2",
            "plucky-server-cloudimg-amd64.img",
        ]);
        let t = resolve("plucky", &search(c.clone())).unwrap();
        assert_eq!(t.name, "plucky-server-cloudimg-amd64.img");
        assert_eq!(t.pool, "default");
        assert_eq!(
            t.path,
            PathBuf::from("/var/lib/libvirt/images/plucky-server-cloudimg-amd64.img")
        );
    }

    #[test]
    fn exact_stem_matches() {
        let c = candidates(&["ubuntu24.04.qcow2"]);
        assert_eq!(resolve("ubuntu24.04", &search(c.clone())).unwrap().name, "ubuntu24.04.qcow2");
    }

    #[test]
    fn extension_is_not_part_of_the_match() {
        let c = candidates(&["alpine.qcow2"]);
        assert!(matches!(
            resolve("alpine.q", &search(c.clone())),
            Err(VmmgrError::NoMatch { .. })
        ));
    }

    #[test]
    fn ambiguous_lists_exactly_the_matches() {
        let c = candidates(&[
            "fedora-41-x86_64-kvm.qcow2",
            "fedora-42-x86_64-kvm.qcow2",
            "rhel-9.4-x86_64-kvm.qcow2",
        ]);
        match resolve("fedora", &search(c.clone())) {
            Err(VmmgrError::AmbiguousMatch { pattern, matches }) => {
                assert_eq!(pattern, "fedora");
                assert_eq!(
                    matches,
                    vec![
                        "default/fedora-41-x86_64-kvm.qcow2".to_string(),
                        "default/fedora-42-x86_64-kvm.qcow2".to_string(),
                    ]
                );
            }
            other => panic!("expected AmbiguousMatch, got {other:?}"),
        }
        assert_eq!(
            resolve("fedora-42", &search(c.clone())).unwrap().name,
            "fedora-42-x86_64-kvm.qcow2"
        );
    }

    #[test]
    fn same_name_in_two_pools_is_ambiguous() {
        let c = vec![
            TemplateCandidate::new("default", "/a/debian-12.qcow2"),
            TemplateCandidate::new("images", "/b/debian-12.qcow2"),
        ];
        assert!(matches!(
            resolve("debian", &search(c.clone())),
            Err(VmmgrError::AmbiguousMatch { .. })
        ));
    }

    #[test]
    fn no_match_names_pattern_and_pools() {
        let c = candidates(&["fedora-42-x86_64-kvm.qcow2"]);
        let err = resolve("arch", &search(c.clone())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'arch'"));
        assert!(msg.contains("default, images"));
    }

    #[test]
    fn no_match_separates_missing_pools() {
        let found = TemplateSearch {
            candidates: candidates(&["fedora-42-x86_64-kvm.qcow2"]),
            searched: vec!["default".into()],
            missing: vec!["images".into()],
        };
        let err = resolve("arch", &found).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no VM template images matching 'arch' in pools: default (configured but not found: images)"
        );
    }

    #[test]
    fn no_match_with_no_pool_found() {
        let found = TemplateSearch {
            missing: vec!["default".into()],
            ..Default::default()
        };
        let err = resolve("arch", &found).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no VM template images matching 'arch' in pools: (none) (configured but not found: default)"
        );
    }

    #[test]
    fn empty_candidate_list_is_no_match() {
        assert!(matches!(
            resolve("fedora", &search(vec![])),
            Err(VmmgrError::NoMatch { .. })
        ));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let c = candidates(&["Fedora-42.qcow2"]);
        assert!(resolve("fedora", &search(c.clone())).is_err());
        assert!(resolve("Fedora", &search(c.clone())).is_ok());
    }

    #[test]
    fn empty_pattern_rejected() {
        let c = candidates(&["fedora-42.qcow2"]);
        assert!(matches!(
            resolve("", &search(c.clone())),
            Err(VmmgrError::Validation { .. })
        ));
    }

    #[test]
    fn strip_only_known_extensions() {
        assert_eq!(strip_image_extension("a.qcow2"), "a");
        assert_eq!(strip_image_extension("a.IMG"), "a");
        assert_eq!(strip_image_extension("a.iso"), "a.iso");
        assert_eq!(strip_image_extension("rhel-8.10"), "rhel-8.10");
    }

    #[test]
    fn image_detection_by_extension() {
        assert!(is_image(Path::new("/x/a.qcow2")));
        assert!(is_image(Path::new("/x/a.Img")));
        assert!(!is_image(Path::new("/x/a.iso")));
        assert!(!is_image(Path::new("/x/README")));
    }

    #[test]
    fn list_filters_and_sorts() {
        let c = candidates(&["rhel-9.qcow2", "fedora-42.qcow2", "fedora-41.qcow2"]);
        let all = filter(&c, None);
        assert_eq!(
            all.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["fedora-41.qcow2", "fedora-42.qcow2", "rhel-9.qcow2"]
        );
        let fedora = filter(&c, Some("fedora"));
        assert_eq!(
            render_list(&fedora),
            "Available VM template images:\n fedora-41.qcow2\n fedora-42.qcow2\n"
        );
    }
}
