//! Tool paths, signing credentials and behaviour switches, in one place.
//! Components take a `&dyn ConfigProvider` when they are constructed instead of reading settings themselves.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

/// Directory used by apklab for its own data, relative to the home directory.
pub const DATA_DIR_NAME: &str = ".apklab";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Credentials used to sign rebuilt APKs with a user supplied keystore.
#[derive(Debug, Clone, PartialEq)]
pub struct KeystoreCredentials {
    pub keystore_path: PathBuf,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,
}

pub trait ConfigProvider {
    /// The Java runtime used to launch apktool and the APK signer.
    fn java_path(&self) -> String;

    /// Path of the apktool JAR. Empty if not configured.
    fn apktool_path(&self) -> String;

    /// Directory that jadx was extracted to. Empty if not configured.
    fn jadx_dir_path(&self) -> String;

    /// Path of the uber-apk-signer JAR. Empty if not configured.
    fn apk_signer_path(&self) -> String;

    /// The directory quark must be run from (it holds the downloaded rules).
    fn quark_data_dir(&self) -> PathBuf;

    /// Returns the keystore credentials only if all four values are configured.
    fn keystore(&self) -> Option<KeystoreCredentials>;

    /// Whether decoded projects should be initialised as git repositories.
    fn init_project_dir_as_git(&self) -> bool;
}

/// Settings loaded from `~/.apklab/config.json`.
/// Keys use the same names as the settings of the APKLab editor extension.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub java_path: Option<String>,
    pub apktool_path: String,
    pub jadx_dir_path: String,
    pub apk_signer_path: String,
    pub quark_data_dir: Option<PathBuf>,
    pub keystore_path: String,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,
    pub init_project_dir_as_git: Option<bool>,
}

impl Settings {
    /// The default location of the settings file, if a home directory could be found.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DATA_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads settings from the given JSON file. A missing file gives the default settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings at {path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).context("Reading settings file")?;
        serde_json::from_str(&contents).context("Settings file was invalid JSON")
    }

    /// Loads from `path` if given, otherwise from the default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default_path) => Self::load(default_path),
                None => {
                    warn!("Could not find the home directory, using default settings");
                    Ok(Self::default())
                }
            },
        }
    }
}

impl ConfigProvider for Settings {
    fn java_path(&self) -> String {
        self.java_path.clone().unwrap_or_else(|| "java".to_string())
    }

    fn apktool_path(&self) -> String {
        self.apktool_path.clone()
    }

    fn jadx_dir_path(&self) -> String {
        self.jadx_dir_path.clone()
    }

    fn apk_signer_path(&self) -> String {
        self.apk_signer_path.clone()
    }

    fn quark_data_dir(&self) -> PathBuf {
        match &self.quark_data_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(".quark-engine"),
        }
    }

    fn keystore(&self) -> Option<KeystoreCredentials> {
        if self.keystore_path.is_empty()
            || self.keystore_password.is_empty()
            || self.key_alias.is_empty()
            || self.key_password.is_empty()
        {
            return None;
        }

        Some(KeystoreCredentials {
            keystore_path: PathBuf::from(&self.keystore_path),
            keystore_password: self.keystore_password.clone(),
            key_alias: self.key_alias.clone(),
            key_password: self.key_password.clone(),
        })
    }

    fn init_project_dir_as_git(&self) -> bool {
        self.init_project_dir_as_git.unwrap_or(true)
    }
}
