use super::IdentityRegistry;
use crate::config::PersistConfig;
use crate::core::{NodeHandle, NodeKind, PersistError, Result};
use crate::host::GraphHost;
use regex::Regex;
use tracing::{Level, event};

/// Outer chains deeper than this are treated as cyclic
const MAX_OUTER_DEPTH: usize = 64;

/// Normalizes full paths so ids survive runtime package renames.
#[derive(Debug, Clone, Default)]
pub struct PathRemapper {
    strip_prefixes: Vec<String>,
    play_session: Option<Regex>,
}

impl PathRemapper {
    pub fn new(strip_prefixes: &[String], play_session_prefix: Option<&str>) -> Result<Self> {
        let play_session = match play_session_prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => {
                // e.g. `UEDPIE_0_Town` -> `Town` at any path segment start
                let pattern = format!(r"(^|[/.:])[A-Za-z]*{}\d+_", regex::escape(prefix));
                Some(Regex::new(&pattern).map_err(|e| {
                    PersistError::Config(format!("Failed to compile play session pattern: {}", e))
                })?)
            }
            None => None,
        };
        Ok(Self {
            strip_prefixes: strip_prefixes.to_vec(),
            play_session,
        })
    }

    pub fn from_config(config: &PersistConfig) -> Result<Self> {
        Self::new(&config.strip_path_prefixes, config.play_session_prefix.as_deref())
    }

    pub fn remap(&self, path: &str) -> String {
        let mut out = path;
        for prefix in &self.strip_prefixes {
            if let Some(rest) = out.strip_prefix(prefix.as_str()) {
                if rest.is_empty() || rest.starts_with('/') {
                    out = rest;
                    break;
                }
            }
        }
        match &self.play_session {
            Some(re) => re.replace_all(out, "$1").into_owned(),
            None => out.to_string(),
        }
    }
}

/// Stable path of `node`, or `None` when it has no deterministic position.
///
/// Pure: only reads the host and the registry.
pub fn stable_path(host: &dyn GraphHost, registry: &IdentityRegistry, node: NodeHandle) -> Option<String> {
    stable_path_at(host, registry, node, 0)
}

fn stable_path_at(host: &dyn GraphHost, registry: &IdentityRegistry, node: NodeHandle, depth: usize) -> Option<String> {
    if depth > MAX_OUTER_DEPTH || !host.is_alive(node) {
        return None;
    }

    if host.is_full_name_stable(node) {
        return host.path_name(node).map(|path| registry.remapper().remap(&path));
    }

    let outer = host.outer(node);

    if host.is_name_stable(node) {
        let outer_id = outer.and_then(|o| registry.find(o))?;
        let name = host.name(node)?;
        return Some(format!("{}.{}", outer_id, name));
    }

    if host.kind(node) == Some(NodeKind::Subsystem) {
        let outer_path = stable_path_at(host, registry, outer?, depth + 1)?;
        let class = host.class(node)?;
        return Some(format!("{}.{}", outer_path, class.short_name()));
    }

    let override_name = host.object(node).and_then(|o| o.stable_name())?;
    match outer.and_then(|o| stable_path_at(host, registry, o, depth + 1)) {
        Some(outer_path) => Some(format!("{}.{}", outer_path, override_name)),
        None => {
            event!(
                Level::ERROR,
                node = %node,
                stable_name = %override_name,
                "Stable name override used on a node whose outer has no stable path"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix_only_at_segment_boundary() {
        let remapper = PathRemapper::new(&["/Memory".to_string()], None).unwrap();
        assert_eq!(remapper.remap("/Memory/Maps/Town"), "/Maps/Town");
        assert_eq!(remapper.remap("/MemoryLane/Town"), "/MemoryLane/Town");
    }

    #[test]
    fn test_play_session_prefix_removed_everywhere() {
        let remapper = PathRemapper::new(&[], Some("PIE_")).unwrap();
        assert_eq!(
            remapper.remap("/Game/Maps/UEDPIE_0_Town.UEDPIE_0_Town:PersistentLevel.Door"),
            "/Game/Maps/Town.Town:PersistentLevel.Door"
        );
        assert_eq!(remapper.remap("/Game/PIE_Tower"), "/Game/PIE_Tower");
    }

    #[test]
    fn test_default_remapper_is_identity() {
        assert_eq!(PathRemapper::default().remap("/Temp/x"), "/Temp/x");
    }
}
