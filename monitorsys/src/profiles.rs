//! Named connection targets, persisted as JSON in the user's config directory.

use std::{
    collections::BTreeMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_DIR: &str = "monitorsys";
const FILE_NAME: &str = "profiles.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileEntry {
    // ws(s):// endpoint or http(s):// origin
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Profiles {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileEntry>,
}

impl Profiles {
    pub fn get(&self, name: &str) -> Option<&ProfileEntry> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ProfileEntry) {
        self.profiles.insert(name.into(), entry);
    }
}

/// Location of the profiles file. Reads are lenient; writes create parent dirs.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// `$XDG_CONFIG_HOME/monitorsys/profiles.json`, else the platform config dir.
    pub fn open_default() -> Self {
        let base = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs_next::config_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join(APP_DIR).join(FILE_NAME))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty set. So is a corrupt one, with a warning.
    pub fn load(&self) -> Profiles {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Profiles::default(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), "ignoring unreadable profiles: {e}");
            Profiles::default()
        })
    }

    pub fn save(&self, profiles: &Profiles) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(profiles)?)
    }
}

#[derive(Debug, PartialEq)]
pub enum ResolveProfile {
    /// Use the provided runtime inputs (url, tls_ca); the caller may persist them.
    Direct(String, Option<String>),
    /// Loaded from an existing profile entry (url, tls_ca)
    Loaded(String, Option<String>),
    /// Prompt the user to select among these profile names
    PromptSelect(Vec<String>),
    /// Prompt the user to create the named profile
    PromptCreate(String),
    /// Nothing to connect to
    None,
}

pub struct ProfileRequest {
    pub profile_name: Option<String>,
    pub url: Option<String>,
    pub tls_ca: Option<String>,
}

impl ProfileRequest {
    pub fn resolve(self, profiles: &Profiles) -> ResolveProfile {
        match (self.profile_name, self.url) {
            (_, Some(url)) => ResolveProfile::Direct(url, self.tls_ca),
            (Some(name), None) => match profiles.get(&name) {
                Some(entry) => ResolveProfile::Loaded(
                    entry.url.clone(),
                    self.tls_ca.or_else(|| entry.tls_ca.clone()),
                ),
                None => ResolveProfile::PromptCreate(name),
            },
            (None, None) if profiles.is_empty() => ResolveProfile::None,
            (None, None) => ResolveProfile::PromptSelect(profiles.names()),
        }
    }
}
