use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "pose-graphs")]
    pose_graphs: HashMap<String, PoseGraphEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoseGraphEntry {
    Path(String),
    Detailed {
        graph: String,
        #[serde(default)]
        script: Option<String>,
    },
}

impl PoseGraphEntry {
    fn graph(&self) -> &str {
        match self {
            PoseGraphEntry::Path(path) => path,
            PoseGraphEntry::Detailed { graph, .. } => graph,
        }
    }

    fn script(&self) -> Option<&str> {
        match self {
            PoseGraphEntry::Path(_) => None,
            PoseGraphEntry::Detailed { script, .. } => script.as_deref(),
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod pose_graphs {
    use super::*;

    pub fn keys() -> Vec<String> {
        let mut keys: Vec<String> = MANIFEST.pose_graphs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.pose_graphs, "pose graph", name)?;
        read_to_string(entry.graph())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.pose_graphs, "pose graph", name)?;
        Ok(resolve_path(entry.graph()))
    }

    /// Frame-by-frame expectations recorded for a graph, if any.
    pub fn script<T: DeserializeOwned>(name: &str) -> Result<Option<T>> {
        let entry = lookup(&MANIFEST.pose_graphs, "pose graph", name)?;
        match entry.script() {
            Some(script) => super::load_json(script).map(Some),
            None => Ok(None),
        }
    }
}
