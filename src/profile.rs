//! Parameter batches and named profiles
//!
//! A profile is a mapping of batch keys (`strip-0`, `bus-3`, `vban-out-1`)
//! to parameter assignments, optionally extending another profile:
//!
//! ```toml
//! extends = "base"
//!
//! [strip-0]
//! label = "Mic"
//! gain = -3.0
//! A1 = true
//!
//! [bus-1]
//! mode = "composite"
//! ```

use crate::channel::{ChannelKind, ChannelRef};
use crate::error::{Result, VbanError};
use crate::kinds::Kind;
use crate::types::{BusMode, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Assignments of one channel, keyed by parameter name
pub type ChannelParams = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Name of a profile this one is merged over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(flatten)]
    pub channels: BTreeMap<String, ChannelParams>,
}

impl Profile {
    /// Set one parameter of one batch key
    pub fn set(&mut self, key: &str, param: &str, value: impl Into<ParamValue>) -> &mut Self {
        self.channels
            .entry(key.to_string())
            .or_default()
            .insert(param.to_string(), value.into());
        self
    }

    /// Overlay `other` on top of `self`; `other` wins per parameter
    fn merge(&mut self, other: &Profile) {
        for (key, params) in &other.channels {
            let target = self.channels.entry(key.clone()).or_default();
            for (param, value) in params {
                target.insert(param.clone(), value.clone());
            }
        }
    }
}

/// Parse a TOML profile document
pub fn parse_toml(text: &str) -> Result<Profile> {
    Ok(toml::from_str(text)?)
}

/// Parse a JSON object of the same shape as a TOML profile
pub fn parse_json(text: &str) -> Result<Profile> {
    Ok(serde_json::from_str(text)?)
}

/// The assignments of one channel, sent as one datagram
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelScript {
    pub channel: ChannelRef,
    /// Fully qualified identifier and value per assignment
    pub assignments: Vec<(String, ParamValue)>,
}

impl ChannelScript {
    /// `Strip[0].mute=1;Strip[0].gain=-3;`
    pub fn text(&self) -> String {
        self.assignments
            .iter()
            .map(|(identifier, value)| format!("{}={};", identifier, value.to_script()))
            .collect()
    }
}

/// Validate every key of a batch and translate it into per-channel scripts
///
/// Nothing is sent here; any unknown key, out-of-range index, empty
/// parameter name or unknown bus mode fails the whole batch.
pub fn build_scripts(batch: &Profile, kind: &Kind) -> Result<Vec<ChannelScript>> {
    let mut scripts = Vec::with_capacity(batch.channels.len());
    for (key, params) in &batch.channels {
        let channel = ChannelRef::parse_key(key, kind)?;
        let mut assignments = Vec::with_capacity(params.len());
        for (param, value) in params {
            if param.is_empty() {
                return Err(VbanError::Value(format!("empty parameter name under '{}'", key)));
            }
            assignments.push(assignment(&channel, param, value)?);
        }
        if !assignments.is_empty() {
            scripts.push(ChannelScript { channel, assignments });
        }
    }
    Ok(scripts)
}

fn assignment(channel: &ChannelRef, param: &str, value: &ParamValue) -> Result<(String, ParamValue)> {
    match (param, value) {
        ("mode", ParamValue::Text(mode)) => {
            let mode: BusMode = mode.parse()?;
            Ok((channel.param(&format!("mode.{}", mode.as_str())), ParamValue::Bool(true)))
        }
        ("eq", _) if channel.kind() == ChannelKind::Bus => Ok((channel.param("eq.on"), value.clone())),
        _ => Ok((channel.param(param), value.clone())),
    }
}

/// Profiles known to one session
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Store holding the built-in `blank` and `base` profiles of a kind
    pub fn builtin(kind: &Kind) -> Self {
        let mut store = Self::default();
        store.insert("blank", blank(kind));
        store.insert("base", base(kind));
        store
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: Profile) {
        self.profiles.insert(name.into(), profile);
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Look up a profile and merge it over everything it extends
    pub fn resolve(&self, name: &str) -> Result<Profile> {
        let mut chain: Vec<&str> = Vec::new();
        let mut next = Some(name);
        while let Some(current) = next {
            if chain.contains(&current) {
                return Err(VbanError::Value(format!(
                    "profile '{}' extends itself through {:?}",
                    name, chain
                )));
            }
            let profile = self.profiles.get(current).ok_or_else(|| VbanError::ProfileNotFound {
                name: current.to_string(),
                known: self.names(),
            })?;
            chain.push(current);
            next = profile.extends.as_deref();
        }

        // root first, so every child overrides its parent
        let mut resolved = Profile::default();
        for current in chain.iter().rev() {
            if let Some(profile) = self.profiles.get(*current) {
                resolved.merge(profile);
            }
        }
        Ok(resolved)
    }

    /// Load every `*.toml` file in `dir`, named by file stem
    ///
    /// Files that fail to parse are logged and skipped.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for entry in fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "toml") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match fs::read_to_string(&path)
                .map_err(VbanError::from)
                .and_then(|text| parse_toml(&text))
            {
                Ok(profile) => {
                    tracing::info!("Loaded profile {} from {}", name, path.display());
                    self.insert(name, profile);
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Invalid TOML profile {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Load from `./profiles/<kind>` and `~/Documents/Voicemeeter/profiles/<kind>`
    pub fn load_default_dirs(&mut self, kind: &Kind) -> usize {
        let mut loaded = 0;
        for dir in default_dirs(kind) {
            if !dir.is_dir() {
                continue;
            }
            match self.load_dir(&dir) {
                Ok(n) => loaded += n,
                Err(e) => tracing::warn!("Unable to read profiles in {}: {}", dir.display(), e),
            }
        }
        loaded
    }
}

fn default_dirs(kind: &Kind) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("profiles").join(kind.id)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join("Documents").join("Voicemeeter").join("profiles").join(kind.id));
    }
    paths
}

/// Everything neutral: gains at 0 dB, flags and routes off
fn blank(kind: &Kind) -> Profile {
    let mut profile = Profile::default();
    for i in 0..kind.num_strip() {
        let key = format!("strip-{}", i);
        for flag in ["solo", "mute", "mono"] {
            profile.set(&key, flag, false);
        }
        profile.set(&key, "gain", 0.0);
        for a in 1..=kind.phys_out {
            profile.set(&key, &format!("A{}", a), false);
        }
        for b in 1..=kind.virt_out {
            profile.set(&key, &format!("B{}", b), false);
        }
        if i < kind.phys_in {
            profile.set(&key, "comp", 0.0);
            profile.set(&key, "gate", 0.0);
        }
    }
    for i in 0..kind.num_bus() {
        let key = format!("bus-{}", i);
        profile.set(&key, "gain", 0.0);
        for flag in ["eq.on", "mute", "mono"] {
            profile.set(&key, flag, false);
        }
    }
    profile
}

/// Blank plus physical strips on B1 and virtual strips on A1
fn base(kind: &Kind) -> Profile {
    let mut profile = blank(kind);
    for i in 0..kind.num_strip() {
        let route = if i < kind.phys_in { "B1" } else { "A1" };
        profile.set(&format!("strip-{}", i), route, true);
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{BANANA, BASIC, POTATO};

    #[test]
    fn test_builtin_profiles() {
        let store = ProfileStore::builtin(&BANANA);
        assert_eq!(store.names(), vec!["base", "blank"]);

        let base = store.resolve("base").unwrap();
        assert_eq!(base.channels.len(), 5 + 5);
        assert_eq!(base.channels["strip-0"]["B1"], ParamValue::Bool(true));
        assert_eq!(base.channels["strip-3"]["A1"], ParamValue::Bool(true));
        assert!(base.channels["strip-0"].contains_key("comp"));
        assert!(!base.channels["strip-3"].contains_key("comp"));
        assert!(!base.channels["strip-0"].contains_key("A4"));
        assert_eq!(base.channels["bus-4"]["eq.on"], ParamValue::Bool(false));
    }

    #[test]
    fn test_extends_merges_child_over_parent() {
        let mut store = ProfileStore::builtin(&BASIC);
        let child = parse_toml(
            r#"
            extends = "base"

            [strip-0]
            mute = true
            label = "Mic"

            [bus-1]
            mode = "amix"
            "#,
        )
        .unwrap();
        assert_eq!(child.extends.as_deref(), Some("base"));
        store.insert("streaming", child);

        let resolved = store.resolve("streaming").unwrap();
        assert_eq!(resolved.extends, None);
        assert_eq!(resolved.channels["strip-0"]["mute"], ParamValue::Bool(true));
        assert_eq!(resolved.channels["strip-0"]["B1"], ParamValue::Bool(true));
        assert_eq!(resolved.channels["strip-0"]["label"], ParamValue::from("Mic"));
        assert_eq!(resolved.channels["bus-1"]["mode"], ParamValue::from("amix"));
        assert_eq!(resolved.channels["bus-1"]["gain"], ParamValue::Float(0.0));
    }

    #[test]
    fn test_unknown_and_cyclic_profiles() {
        let mut store = ProfileStore::builtin(&BASIC);
        match store.resolve("missing") {
            Err(VbanError::ProfileNotFound { name, known }) => {
                assert_eq!(name, "missing");
                assert_eq!(known, vec!["base", "blank"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut a = Profile::default();
        a.extends = Some("b".to_string());
        let mut b = Profile::default();
        b.extends = Some("a".to_string());
        store.insert("a", a);
        store.insert("b", b);
        assert!(matches!(store.resolve("a"), Err(VbanError::Value(_))));

        let mut dangling = Profile::default();
        dangling.extends = Some("nowhere".to_string());
        store.insert("dangling", dangling);
        assert!(matches!(store.resolve("dangling"), Err(VbanError::ProfileNotFound { .. })));
    }

    #[test]
    fn test_build_scripts() {
        let mut batch = Profile::default();
        batch
            .set("strip-2", "A1", true)
            .set("strip-2", "gain", -6.5)
            .set("bus-1", "mode", "Composite")
            .set("bus-1", "eq", true)
            .set("vban-out-0", "name", "stream1");

        let scripts = build_scripts(&batch, &POTATO).unwrap();
        let texts: Vec<String> = scripts.iter().map(ChannelScript::text).collect();
        assert_eq!(
            texts,
            vec![
                "Bus[1].eq.on=1;Bus[1].mode.composite=1;",
                "Strip[2].A1=1;Strip[2].gain=-6.5;",
                "vban.outstream[0].name=\"stream1\";",
            ]
        );
    }

    #[test]
    fn test_json_batches() {
        let batch = parse_json(r#"{"bus-0": {"gain": -3, "mute": false}}"#).unwrap();
        assert_eq!(batch.extends, None);
        assert_eq!(batch.channels["bus-0"]["gain"], ParamValue::Int(-3));
        assert_eq!(
            build_scripts(&batch, &BASIC).unwrap()[0].text(),
            "Bus[0].gain=-3;Bus[0].mute=0;"
        );
        assert!(matches!(parse_json("[1, 2]"), Err(VbanError::Json(_))));
    }

    #[test]
    fn test_build_scripts_rejects_bad_batches() {
        let mut out_of_range = Profile::default();
        out_of_range.set("strip-0", "mute", true).set("bus-99", "mute", true);
        assert!(matches!(build_scripts(&out_of_range, &POTATO), Err(VbanError::Value(_))));

        let mut unknown_kind = Profile::default();
        unknown_kind.set("fader-0", "gain", 0.0);
        assert!(build_scripts(&unknown_kind, &POTATO).is_err());

        let mut bad_mode = Profile::default();
        bad_mode.set("bus-0", "mode", "surround");
        assert!(build_scripts(&bad_mode, &POTATO).is_err());

        let mut empty_param = Profile::default();
        empty_param.set("bus-0", "", 1);
        assert!(build_scripts(&empty_param, &POTATO).is_err());
    }

    #[test]
    fn test_load_dir_skips_invalid_files() {
        let dir = std::env::temp_dir().join(format!("vban-cmd-profiles-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("podcast.toml"), "extends = \"blank\"\n[strip-0]\nmute = true\n").unwrap();
        fs::write(dir.join("broken.toml"), "[strip-0\nmute = ").unwrap();
        fs::write(dir.join("notes.txt"), "not a profile").unwrap();

        let mut store = ProfileStore::builtin(&BASIC);
        assert_eq!(store.load_dir(&dir).unwrap(), 1);
        assert!(store.get("podcast").is_some());
        assert!(store.get("broken").is_none());
        assert_eq!(store.resolve("podcast").unwrap().channels["strip-0"]["mute"], ParamValue::Bool(true));

        fs::remove_dir_all(&dir).unwrap();
    }
}
