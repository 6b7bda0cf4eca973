use crate::types::opaque_token;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_FILE: &str = "visitor.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct VisitorState {
    #[serde(default)]
    visitor_id: Option<String>,
    #[serde(default)]
    last_seen: BTreeMap<String, DateTime<Utc>>,
}

/// Durable per-profile state: the visitor identity and the last-seen
/// markers keyed by it. Everything lives in one small json file under the
/// storage dir; writes go through a temp file and rename.
pub struct VisitorStore {
    path: PathBuf,
    state: VisitorState,
}

impl VisitorStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE);
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read visitor state: {}", path.display()))?;
            if content.trim().is_empty() {
                VisitorState::default()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("failed to parse visitor state: {}", path.display())
                })?
            }
        } else {
            VisitorState::default()
        };
        Ok(Self { path, state })
    }

    /// Returns the durable visitor identity, minting and persisting a fresh
    /// one on first use.
    pub fn load_or_create_visitor(&mut self) -> Result<String> {
        if let Some(id) = &self.state.visitor_id {
            return Ok(id.clone());
        }
        let id = opaque_token("visitor", Utc::now());
        debug!("created visitor identity {id}");
        self.state.visitor_id = Some(id.clone());
        self.save()?;
        Ok(id)
    }

    pub fn last_seen(&self, visitor_id: &str) -> Option<DateTime<Utc>> {
        self.state.last_seen.get(visitor_id).copied()
    }

    pub fn advance_last_seen(&mut self, visitor_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.state.last_seen.insert(visitor_id.to_string(), at);
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create storage dir: {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&self.state).context("failed to serialize visitor state")?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("failed to write visitor state: {}", tmp.display()))?;
        file.write_all(content.as_bytes())
            .context("failed to write visitor state")?;
        file.sync_all().context("failed to flush visitor state")?;
        drop(file);
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace visitor state: {}", self.path.display()))?;
        Ok(())
    }
}
