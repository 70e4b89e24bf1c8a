//! Reading the target path out of libvirt storage pool XML.

use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::VmmgrError;

/// The first non-empty `<path>` text in a pool definition.
pub fn pool_path(xml: &str) -> Result<PathBuf, VmmgrError> {
    let parse_err = |message: String| VmmgrError::XmlParse {
        what: "storage pool".into(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_path = false;

    loop {
        match reader.read_event().map_err(|e| parse_err(e.to_string()))? {
            Event::Start(e) if e.local_name().as_ref() == b"path" => in_path = true,
            Event::End(e) if e.local_name().as_ref() == b"path" => in_path = false,
            Event::Text(t) if in_path => {
                let text = t.unescape().map_err(|e| parse_err(e.to_string()))?;
                if !text.is_empty() {
                    return Ok(PathBuf::from(text.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(parse_err("<path> element not found".into()))
}
