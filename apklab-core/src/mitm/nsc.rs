use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apklab_xml::Element;
use log::{debug, info};

use super::{patch_parse_error, read_xml, write_xml};

/// Written when the app has no network security config of its own.
/// Trusts user-installed CAs in debuggable builds.
pub const DEFAULT_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<network-security-config>
    <debug-overrides>
        <trust-anchors>
            <certificates src="user" />
        </trust-anchors>
    </debug-overrides>
</network-security-config>
"#;

const ROOT: &str = "network-security-config";
const PIN_SET: &str = "pin-set";
const DEBUG_OVERRIDES: &str = "debug-overrides";
const TRUST_ANCHORS: &str = "trust-anchors";
const CERTIFICATES: &str = "certificates";

/// Location of the XML resource with the given name within a decoded project.
pub fn nsc_path(project_dir: &Path, name: &str) -> PathBuf {
    project_dir.join("res").join("xml").join(format!("{name}.xml"))
}

/// Removes every pin set and makes sure that user certificates are trusted in debug builds.
/// Returns true if the config was changed.
pub fn patch_config(root: &mut Element) -> bool {
    let original = root.clone();

    let removed = root.remove_descendants(PIN_SET);
    if removed > 0 {
        debug!("Removed {removed} pin set(s)");
    }

    let trust_anchors = root.child_or_insert(DEBUG_OVERRIDES).child_or_insert(TRUST_ANCHORS);
    let trusts_user = trust_anchors
        .child_elements()
        .any(|element| element.is(CERTIFICATES) && element.attr("src", None) == Some("user"));
    if !trusts_user {
        trust_anchors.push_child(Element::new(CERTIFICATES).with_attr("src", "user"));
    }

    *root != original
}

/// Patches the config at `path`, creating it with [DEFAULT_CONFIG] if it doesn't exist.
/// Returns true if the file was written.
pub fn patch_config_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        info!("Creating network security config at {path:?}");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Creating res/xml")?;
        }
        std::fs::write(path, DEFAULT_CONFIG).context("Writing default network security config")?;
        return Ok(true);
    }

    let mut config = read_xml(path)?;
    if !config.root.is(ROOT) {
        return Err(patch_parse_error(path, format!("root element is not {ROOT}")));
    }
    if !patch_config(&mut config.root) {
        debug!("Network security config already trusts user certificates");
        return Ok(false);
    }

    info!("Updating network security config at {path:?}");
    write_xml(path, &config)?;
    Ok(true)
}
