use std::path::Path;

use anyhow::Result;
use apklab_xml::ANDROID_NS_URI;

use super::{patch_parse_error, read_xml, write_xml};

pub const MANIFEST_FILENAME: &str = "AndroidManifest.xml";
/// Used when the manifest doesn't reference a network security config yet.
pub const DEFAULT_NSC_NAME: &str = "network_security_config";

const NSC_ATTRIBUTE: &str = "networkSecurityConfig";
const XML_RESOURCE_PREFIX: &str = "@xml/";

/// Gets the name of the XML resource the manifest uses as its network security config.
/// If the manifest has none (or references something that is not an XML resource), it is pointed
/// at [DEFAULT_NSC_NAME] and rewritten.
/// Returns the resource name, and whether the manifest was changed.
pub fn ensure_nsc_reference(project_dir: &Path) -> Result<(String, bool)> {
    let manifest_path = project_dir.join(MANIFEST_FILENAME);
    let mut manifest = read_xml(&manifest_path)?;
    if !manifest.root.is("manifest") {
        return Err(patch_parse_error(&manifest_path, "root element is not manifest"));
    }

    let application = manifest
        .root
        .child_mut("application")
        .ok_or_else(|| patch_parse_error(&manifest_path, "manifest has no application element"))?;

    let existing = application
        .attr(NSC_ATTRIBUTE, Some(ANDROID_NS_URI))
        .and_then(|value| value.strip_prefix(XML_RESOURCE_PREFIX))
        .filter(|name| !name.is_empty());
    if let Some(name) = existing {
        return Ok((name.to_string(), false));
    }

    application.set_ns_attr(
        NSC_ATTRIBUTE,
        ANDROID_NS_URI,
        "android",
        &format!("{XML_RESOURCE_PREFIX}{DEFAULT_NSC_NAME}"),
    );
    write_xml(&manifest_path, &manifest)?;

    Ok((DEFAULT_NSC_NAME.to_string(), true))
}
