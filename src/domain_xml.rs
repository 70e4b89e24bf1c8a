//! Facts read from a libvirt domain definition: disk paths, MAC addresses,
//! libosinfo id and guest agent channel state.

use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::VmmgrError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFacts {
    /// Absolute `<source file|dev>` paths of every `<disk>`. Backing stores
    /// are not included.
    pub disks: Vec<PathBuf>,
    pub os_id: Option<String>,
    pub os_version_id: Option<String>,
    /// A `org.qemu.guest_agent.*` channel reports `state='connected'`.
    pub agent_connected: bool,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Split a libosinfo URI like `http://fedoraproject.org/fedora/42` into
/// `("fedora", "42")`.
pub fn split_osinfo_uri(uri: &str) -> Option<(String, String)> {
    let rest = uri.split_once("://").map_or(uri, |(_, r)| r);
    let (_, path) = rest.split_once('/')?;
    let path = path.trim_matches('/');
    if path.is_empty() {
        return None;
    }
    let (id, version) = path.split_once('/').unwrap_or((path, ""));
    Some((id.to_string(), version.to_string()))
}

pub fn parse(xml: &str) -> Result<DomainFacts, VmmgrError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut facts = DomainFacts::default();
    let mut stack: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| VmmgrError::XmlParse {
            what: "domain".into(),
            message: e.to_string(),
        })?;
        let (e, empty) = match event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                stack.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let parent = stack.last().map(String::as_str).unwrap_or("");

        match (parent, tag.as_str()) {
            ("disk", "source") => {
                if let Some(p) = attr(&e, b"file").or_else(|| attr(&e, b"dev"))
                    && p.starts_with('/')
                {
                    facts.disks.push(PathBuf::from(p));
                }
            }
            ("libosinfo", "os") => {
                if let Some((id, version)) = attr(&e, b"id").as_deref().and_then(split_osinfo_uri) {
                    facts.os_id = Some(id).filter(|s| !s.is_empty());
                    facts.os_version_id = Some(version).filter(|s| !s.is_empty());
                }
            }
            ("channel", "target") => {
                let is_agent = attr(&e, b"name")
                    .is_some_and(|n| n.starts_with("org.qemu.guest_agent"));
                let connected = attr(&e, b"state").as_deref() == Some("connected");
                if is_agent && connected {
                    facts.agent_connected = true;
                }
            }
            _ => {}
        }

        if !empty {
            stack.push(tag);
        }
    }

    Ok(facts)
}
