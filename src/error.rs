use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VmmgrError {
    #[error("no VM template images matching '{pattern}' in pools: {pools}{}", not_found_note(missing))]
    #[diagnostic(help("run `vmmgr create --list` to see available templates"))]
    NoMatch {
        pattern: String,
        /// Pools that were actually searched.
        pools: String,
        /// Configured template pools libvirt does not know.
        missing: Vec<String>,
    },

    #[error("ambiguous pattern '{pattern}' matches {}:\n{}", matches.len(), list_lines(matches))]
    #[diagnostic(help("type a longer prefix to select exactly one template"))]
    AmbiguousMatch {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("cloud-init user-data not found or unreadable: {path}")]
    CloudInitNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no SSH public keys (*.pub) found in {dir}")]
    #[diagnostic(help(
        "generate a key with `ssh-keygen` or pass --cloud-init with your own user-data"
    ))]
    NoSSHKeysFound { dir: String },

    #[error("{command} failed with {status}")]
    ExternalToolFailure { command: String, status: String },

    #[error("libvirt pool '{name}' not found")]
    #[diagnostic(help("did you change the VMMGR_POOL environment variable?"))]
    PoolNotFound { name: String },

    #[error("libvirt error: {message}")]
    Libvirt {
        message: String,
        #[help]
        hint: String,
    },

    #[error("failed to parse {what} XML: {message}")]
    XmlParse { what: String, message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

fn not_found_note(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (configured but not found: {})", missing.join(", "))
    }
}

fn list_lines(items: &[String]) -> String {
    items
        .iter()
        .map(|m| format!("  {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}
