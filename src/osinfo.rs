//! Pick the `--osinfo` value for `virt-install` from what `virt-inspector`
//! reports about the template and from the template's file name.

use std::path::Path;
use std::time::Duration;

use indicatif::ProgressBar;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::VmmgrError;
use crate::external::{self, ExternalCommand};

/// Generic Linux id used when nothing more specific is known.
pub const GENERIC_LINUX: &str = "linux2024";

/// Facts `virt-inspector` found about the guest OS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectorData {
    pub osinfo: Option<String>,
    pub distro: Option<String>,
    pub major_version: Option<String>,
    pub minor_version: Option<String>,
    pub name: Option<String>,
}

/// Short ids from `osinfo-query os -f short-id` (two header lines, then one id per line).
pub fn parse_known_os(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(2)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Read the first `<operatingsystem>` of `virt-inspector` XML output.
pub fn parse_inspector_output(xml: &str) -> Result<Option<InspectorData>, VmmgrError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut data: Option<InspectorData> = None;

    loop {
        let event = reader.read_event().map_err(|e| VmmgrError::XmlParse {
            what: "virt-inspector".into(),
            message: e.to_string(),
        })?;
        match event {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "operatingsystem" && data.is_none() {
                    data = Some(InspectorData::default());
                }
                stack.push(tag);
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("operatingsystem") && data.is_some() {
                    break;
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"operatingsystem" && data.is_none() {
                    return Ok(Some(InspectorData::default()));
                }
            }
            Event::Text(t) => {
                let parent_is_os = stack.len() >= 2
                    && stack[stack.len() - 2] == "operatingsystem";
                let (Some(d), true) = (data.as_mut(), parent_is_os) else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map_err(|e| VmmgrError::XmlParse {
                        what: "virt-inspector".into(),
                        message: e.to_string(),
                    })?
                    .into_owned();
                let slot = match stack.last().map(String::as_str) {
                    Some("osinfo") => &mut d.osinfo,
                    Some("distro") => &mut d.distro,
                    Some("major_version") => &mut d.major_version,
                    Some("minor_version") => &mut d.minor_version,
                    Some("name") => &mut d.name,
                    _ => continue,
                };
                *slot = Some(text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(data)
}

/// Choose the best known OS id.
///
/// Inspector `osinfo` first, then distro/version combinations, then a walk
/// over ever shorter prefixes of the file name, then the generic Linux id,
/// finally `unknown`.
pub fn match_osinfo(known: &[String], inspected: Option<&InspectorData>, file_name: &str) -> String {
    let is_known = |candidate: &str| known.iter().any(|k| k == candidate);

    if let Some(data) = inspected {
        if let Some(osinfo) = data.osinfo.as_deref()
            && is_known(osinfo)
        {
            return osinfo.to_string();
        }
        if let Some(distro) = data.distro.as_deref() {
            let major = data.major_version.as_deref().unwrap_or("");
            let minor = data.minor_version.as_deref().unwrap_or("");
            let candidates = [
                format!("{distro}{major}.{minor}"),
                format!("{distro}{major}"),
                format!("{distro}{major}-unknown"),
                distro.to_string(),
                format!("{distro}-unknown"),
            ];
            if let Some(hit) = candidates.into_iter().find(|c| is_known(c)) {
                return hit;
            }
        }
    }

    let mut name = file_name.to_string();
    while !name.is_empty() {
        let squashed = name.replace('-', "");
        let candidates = [
            name.clone(),
            format!("{name}-unknown"),
            squashed.clone(),
            format!("{squashed}-unknown"),
        ];
        if let Some(hit) = candidates
            .into_iter()
            .map(|c| c.to_lowercase())
            .find(|c| is_known(c))
        {
            return hit;
        }
        name.pop();
    }

    if inspected.is_some_and(|d| d.name.as_deref() == Some("linux")) {
        return GENERIC_LINUX.to_string();
    }

    "unknown".to_string()
}

async fn known_os(dry_run: bool) -> Result<Vec<String>, VmmgrError> {
    if dry_run {
        return Ok(vec![GENERIC_LINUX.to_string()]);
    }
    let cmd = ExternalCommand::new("osinfo-query").args(["os", "-f", "short-id"]);
    let output = external::capture(&cmd).await?;
    if !output.status.success() {
        tracing::warn!(status = %output.status, "osinfo-query failed, OS database unavailable");
    }
    Ok(parse_known_os(&String::from_utf8_lossy(&output.stdout)))
}

async fn inspect(image: &Path, dry_run: bool) -> Result<Option<InspectorData>, VmmgrError> {
    if dry_run {
        return Ok(None);
    }
    let cmd = ExternalCommand::new("virt-inspector")
        .arg("-a")
        .arg(image.display().to_string());
    println!("{cmd}");

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Inspecting template image...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let output = external::capture(&cmd).await;
    spinner.finish_and_clear();
    let output = output?;

    if !output.status.success() {
        tracing::warn!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "virt-inspector failed, falling back to file name"
        );
        return Ok(None);
    }

    match parse_inspector_output(&String::from_utf8_lossy(&output.stdout)) {
        Ok(data) => Ok(data),
        Err(e) => {
            tracing::warn!("ignoring virt-inspector output: {e}");
            Ok(None)
        }
    }
}

/// Detect the `--osinfo` value for a template image.
pub async fn detect(image: &Path, dry_run: bool) -> Result<String, VmmgrError> {
    let known = known_os(dry_run).await?;
    let inspected = inspect(image, dry_run).await?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let osinfo = match_osinfo(&known, inspected.as_ref(), &file_name);
    tracing::info!(image = %image.display(), osinfo, "detected OS variant");
    Ok(osinfo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        [
            "fedora41",
            "fedora42",
            "fedora-unknown",
            "rhel8.10",
            "rhel9.4",
            "rhel9-unknown",
            "ubuntu25.04",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn wrap(inner: &str) -> String {
        format!("<operatingsystems><operatingsystem>{inner}</operatingsystem></operatingsystems>")
    }

    #[test]
    fn known_os_skips_header() {
        let out = " Short ID \n----------\n almalinux8 \n fedora42\n\n";
        assert_eq!(parse_known_os(out), vec!["almalinux8", "fedora42"]);
    }

    #[test]
    fn inspector_without_os() {
        assert_eq!(parse_inspector_output("<operatingsystems/>").unwrap(), None);
    }

    #[test]
    fn inspector_single_fields() {
        let data = parse_inspector_output(&wrap("<name>linux</name>")).unwrap();
        assert_eq!(
            data,
            Some(InspectorData {
                name: Some("linux".into()),
                ..Default::default()
            })
        );
        let data = parse_inspector_output(&wrap("<major_version>0</major_version>")).unwrap();
        assert_eq!(data.unwrap().major_version.as_deref(), Some("0"));
        let data = parse_inspector_output(&wrap("<osinfo>fake0</osinfo>")).unwrap();
        assert_eq!(data.unwrap().osinfo.as_deref(), Some("fake0"));
    }

    #[test]
    fn inspector_fedora42() {
        let xml = wrap(
            "<name>linux</name><distro>fedora</distro><major_version>42</major_version>\
             <minor_version>0</minor_version><osinfo>fedora42</osinfo>\
             <filesystems><filesystem dev=\"/dev/sda1\"><type>ext4</type></filesystem></filesystems>",
        );
        assert_eq!(
            parse_inspector_output(&xml).unwrap(),
            Some(InspectorData {
                osinfo: Some("fedora42".into()),
                distro: Some("fedora".into()),
                major_version: Some("42".into()),
                minor_version: Some("0".into()),
                name: Some("linux".into()),
            })
        );
    }

    #[test]
    fn inspector_ignores_nested_name_elements() {
        let xml = wrap("<applications><application><name>bash</name></application></applications><distro>rhel</distro>");
        let data = parse_inspector_output(&xml).unwrap().unwrap();
        assert_eq!(data.name, None);
        assert_eq!(data.distro.as_deref(), Some("rhel"));
    }

    #[test]
    fn inspector_malformed_xml_is_an_error() {
        assert!(parse_inspector_output("<operatingsystems><operatingsystem></x>").is_err());
    }

    #[test]
    fn match_inspector_osinfo() {
        let d = InspectorData {
            osinfo: Some("fedora42".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), "fedora42");
    }

    #[test]
    fn match_inspector_major_minor() {
        let d = InspectorData {
            distro: Some("rhel".into()),
            major_version: Some("8".into()),
            minor_version: Some("10".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), "rhel8.10");
    }

    #[test]
    fn match_inspector_major() {
        let d = InspectorData {
            distro: Some("fedora".into()),
            major_version: Some("41".into()),
            minor_version: Some("0".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), "fedora41");
    }

    #[test]
    fn match_inspector_major_unknown() {
        let d = InspectorData {
            distro: Some("rhel".into()),
            major_version: Some("9".into()),
            minor_version: Some("12".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), "rhel9-unknown");
    }

    #[test]
    fn match_inspector_distro_unknown() {
        let d = InspectorData {
            distro: Some("fedora".into()),
            major_version: Some("43".into()),
            minor_version: Some("0".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), "fedora-unknown");
    }

    #[test]
    fn match_generic_linux() {
        let d = InspectorData {
            name: Some("linux".into()),
            ..Default::default()
        };
        assert_eq!(match_osinfo(&known(), Some(&d), ""), GENERIC_LINUX);
    }

    #[test]
    fn match_file_names() {
        let empty = InspectorData::default();
        assert_eq!(
            match_osinfo(&known(), Some(&empty), "rhel-9.4-x86_64-kvm.qcow2"),
            "rhel9.4"
        );
        assert_eq!(
            match_osinfo(&known(), Some(&empty), "fedora-41-x86_64-kvm.qcow2"),
            "fedora41"
        );
        assert_eq!(
            match_osinfo(&known(), Some(&empty), "fedora-latest-x86_64-kvm.qcow2"),
            "fedora-unknown"
        );
        assert_eq!(match_osinfo(&known(), None, "ubuntu25.04.qcow2"), "ubuntu25.04");
        assert_eq!(match_osinfo(&known(), None, "Fedora-42-Cloud.qcow2"), "fedora42");
    }

    #[test]
    fn match_fallback() {
        assert_eq!(match_osinfo(&known(), Some(&InspectorData::default()), ""), "unknown");
        assert_eq!(match_osinfo(&[], None, "whatever.img"), "unknown");
    }

    #[tokio::test]
    async fn dry_run_skips_tools() {
        let osinfo = detect(Path::new("/nonexistent/linux2024-x.qcow2"), true)
            .await
            .unwrap();
        assert_eq!(osinfo, GENERIC_LINUX);
    }
}
