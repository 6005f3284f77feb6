//! Plugin discovery
//!
//! Built-ins are always present. External plugins are discovered by
//! enumerating the platform-default VST3/CLAP directories; their bundles
//! are reported with whatever metadata the file layout exposes. Results
//! are cached keyed by uid until the next scan.

use std::collections::HashMap;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::api::{PluginDescriptor, PluginKind};
use crate::builtin;

/// Scan cache keyed by uid
#[derive(Debug, Default)]
pub struct PluginRegistry {
    cache: HashMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Refresh the cache: built-ins plus external bundles
    pub fn scan(&mut self, extra_dirs: &[PathBuf]) -> Vec<PluginDescriptor> {
        let mut found = builtin::descriptors();

        let mut dirs = default_external_dirs();
        dirs.extend_from_slice(extra_dirs);
        found.extend(scan_external(&dirs));

        self.cache = found
            .iter()
            .map(|d| (d.uid.clone(), d.clone()))
            .collect();

        tracing::info!(
            plugins = found.len(),
            builtin = builtin::descriptors().len(),
            "plugin scan complete"
        );
        found
    }

    pub fn get(&self, uid: &str) -> Option<&PluginDescriptor> {
        self.cache.get(uid)
    }

    pub fn cached(&self) -> Vec<PluginDescriptor> {
        let mut all: Vec<PluginDescriptor> = self.cache.values().cloned().collect();
        all.sort_by(|a, b| a.uid.cmp(&b.uid));
        all
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Platform-default plugin bundle locations
pub fn default_external_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let home = std::env::var_os("HOME").map(PathBuf::from);

    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/Library/Audio/Plug-Ins/VST3"));
        dirs.push(PathBuf::from("/Library/Audio/Plug-Ins/CLAP"));
        if let Some(home) = &home {
            dirs.push(home.join("Library/Audio/Plug-Ins/VST3"));
            dirs.push(home.join("Library/Audio/Plug-Ins/CLAP"));
        }
    } else if cfg!(target_os = "windows") {
        dirs.push(PathBuf::from("C:\\Program Files\\Common Files\\VST3"));
        dirs.push(PathBuf::from("C:\\Program Files\\Common Files\\CLAP"));
    } else {
        dirs.push(PathBuf::from("/usr/lib/vst3"));
        dirs.push(PathBuf::from("/usr/local/lib/vst3"));
        dirs.push(PathBuf::from("/usr/lib/clap"));
        if let Some(home) = &home {
            dirs.push(home.join(".vst3"));
            dirs.push(home.join(".clap"));
        }
    }
    dirs
}

/// Enumerate plugin bundles under the given directories
pub fn scan_external(dirs: &[PathBuf]) -> Vec<PluginDescriptor> {
    let mut found = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(dir)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let scheme = match extension {
                "vst3" => "vst3",
                "clap" => "clap",
                _ => continue,
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            found.push(PluginDescriptor {
                uid: format!("{}:{}", scheme, stem),
                name: stem.to_string(),
                // Kind is unknown until the bundle is loaded; effects are
                // the safe default for chain placement.
                kind: PluginKind::Effect,
                is_native: false,
                parameters: Vec::new(),
            });
        }
    }

    found.sort_by(|a, b| a.uid.cmp(&b.uid));
    found.dedup_by(|a, b| a.uid == b.uid);
    found
}
