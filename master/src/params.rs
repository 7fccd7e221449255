//! Hot-reloadable scheduling parameters (C4): the risk-formula weights,
//! affinity matrix, and penalty vector used by the RTS scheduler.
//!
//! Loading follows the same `serde_yaml` + `anyhow::Context` pattern as the
//! node configuration loader; the live value is held behind an [`ArcSwap`]
//! so the queue processor's hot path can read a snapshot with no lock, while
//! a background task polls the file for changes (§4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::task::TaskType;

/// How often the background reload task re-reads the parameter file.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

// ── YAML shape ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ParamsFile {
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_beta")]
    beta: f64,
    #[serde(default)]
    theta_load: f64,
    #[serde(default)]
    theta_penalty: f64,
    #[serde(default)]
    theta_affinity: f64,
    #[serde(default)]
    theta_success: f64,
    #[serde(default)]
    affinity: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    penalty: HashMap<String, f64>,
}

fn default_alpha() -> f64 {
    1.0
}
fn default_beta() -> f64 {
    1.0
}

// ── Public snapshot type ─────────────────────────────────────────────────────

/// A single, immutable set of risk-formula parameters. Cheap to clone (it's
/// only ever handed out behind an `Arc`).
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub alpha: f64,
    pub beta: f64,
    pub theta_load: f64,
    pub theta_penalty: f64,
    pub theta_affinity: f64,
    pub theta_success: f64,
    /// affinity[type][worker_class] — defaults to 0.0 for unlisted pairs.
    affinity: HashMap<(TaskType, String), f64>,
    /// penalty[worker_id] — defaults to 0.0 for unlisted workers.
    penalty: HashMap<String, f64>,
}

impl Params {
    pub fn affinity(&self, task_type: TaskType, worker_class: &str) -> f64 {
        self.affinity
            .get(&(task_type, worker_class.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn penalty(&self, worker_id: &str) -> f64 {
        self.penalty.get(worker_id).copied().unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn set_affinity_for_test(&mut self, task_type: TaskType, worker_id: &str, value: f64) {
        self.affinity.insert((task_type, worker_id.to_string()), value);
    }

    fn from_file(file: ParamsFile) -> Result<Self> {
        if file.beta <= 0.0 || file.beta > 100.0 {
            anyhow::bail!("beta must be in (0, 100], got {}", file.beta);
        }
        if !(0.0..=1000.0).contains(&file.alpha) {
            anyhow::bail!("alpha must be in [0, 1000], got {}", file.alpha);
        }
        for (name, theta) in [
            ("theta_load", file.theta_load),
            ("theta_penalty", file.theta_penalty),
            ("theta_affinity", file.theta_affinity),
            ("theta_success", file.theta_success),
        ] {
            if !(0.0..=10.0).contains(&theta) {
                anyhow::bail!("{name} must be in [0, 10], got {theta}");
            }
        }

        let mut affinity = HashMap::new();
        for (type_name, row) in file.affinity {
            let task_type = TaskType::parse(&type_name)
                .with_context(|| format!("unknown task type in affinity matrix: '{type_name}'"))?;
            for (worker_class, v) in row {
                if !(-10.0..=10.0).contains(&v) {
                    anyhow::bail!("affinity[{type_name}][{worker_class}] must be in [-10, 10], got {v}");
                }
                affinity.insert((task_type, worker_class), v);
            }
        }
        for (worker_id, v) in &file.penalty {
            if !(0.0..=100.0).contains(v) {
                anyhow::bail!("penalty[{worker_id}] must be in [0, 100], got {v}");
            }
        }
        Ok(Params {
            alpha: file.alpha,
            beta: file.beta,
            theta_load: file.theta_load,
            theta_penalty: file.theta_penalty,
            theta_affinity: file.theta_affinity,
            theta_success: file.theta_success,
            affinity,
            penalty: file.penalty,
        })
    }
}

impl Default for Params {
    fn default() -> Self {
        Params {
            alpha: 1.0,
            beta: 1.0,
            theta_load: 1.0,
            theta_penalty: 1.0,
            theta_affinity: 1.0,
            theta_success: 1.0,
            affinity: HashMap::new(),
            penalty: HashMap::new(),
        }
    }
}

fn load_from_path(path: &Path) -> Result<Params> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot open parameter file: {}", path.display()))?;
    let file: ParamsFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse parameter YAML: {}", path.display()))?;
    Params::from_file(file)
}

// ── Store ─────────────────────────────────────────────────────────────────

/// Live, hot-reloadable parameter snapshot.
pub struct ParamStore {
    current: ArcSwap<Params>,
    path: PathBuf,
}

impl ParamStore {
    /// Load the initial snapshot from `path`. Fails only if the file is
    /// missing or malformed on first load.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let params = load_from_path(&path)?;
        info!(path = %path.display(), "loaded scheduling parameters");
        Ok(Self {
            current: ArcSwap::from_pointee(params),
            path,
        })
    }

    /// Current snapshot (lock-free read).
    pub fn current(&self) -> Arc<Params> {
        self.current.load_full()
    }

    /// Publish a freshly recomputed penalty vector (§4.8 step 5), keeping
    /// every other field of the current snapshot. Read-copy-update, same as
    /// [`reload`](Self::reload): readers only ever see a complete snapshot.
    pub fn set_penalty(&self, penalty: HashMap<String, f64>) {
        let mut next = (*self.current.load_full()).clone();
        next.penalty = penalty;
        self.current.store(Arc::new(next));
    }

    /// Re-read the parameter file and swap it in if valid. On any error the
    /// previous snapshot is retained and the error is logged, not returned —
    /// this is the policy a background poll loop relies on.
    pub fn reload(&self) {
        match load_from_path(&self.path) {
            Ok(params) => self.current.store(Arc::new(params)),
            Err(e) => warn!(error = %e, path = %self.path.display(), "parameter reload failed, keeping previous snapshot"),
        }
    }

    /// Spawn the background poll loop (§4.4: every [`RELOAD_INTERVAL`]).
    pub fn spawn_reload_task(store: Arc<ParamStore>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RELOAD_INTERVAL);
            loop {
                ticker.tick().await;
                store.reload();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_full_params_file() {
        let yaml = r#"
alpha: 2.0
beta: 0.5
theta_load: 0.3
theta_penalty: 0.2
theta_affinity: 0.4
theta_success: 0.1
affinity:
  gpu-training:
    gpu-node: 1.0
    cpu-node: 0.0
penalty:
  w1: 0.5
"#;
        let f = yaml_tempfile(yaml);
        let store = ParamStore::load(f.path()).unwrap();
        let p = store.current();
        assert_eq!(p.alpha, 2.0);
        assert_eq!(p.beta, 0.5);
        assert_eq!(p.affinity(TaskType::GpuTraining, "gpu-node"), 1.0);
        assert_eq!(p.affinity(TaskType::GpuTraining, "cpu-node"), 0.0);
        assert_eq!(p.affinity(TaskType::CpuLight, "gpu-node"), 0.0);
        assert_eq!(p.penalty("w1"), 0.5);
        assert_eq!(p.penalty("unknown"), 0.0);
    }

    #[test]
    fn rejects_non_positive_beta() {
        let f = yaml_tempfile("alpha: 1.0\nbeta: 0.0\n");
        assert!(ParamStore::load(f.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let f = yaml_tempfile("alpha: 1001.0\nbeta: 1.0\n");
        assert!(ParamStore::load(f.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_theta() {
        let f = yaml_tempfile("alpha: 1.0\nbeta: 1.0\ntheta_load: 99999.0\n");
        assert!(ParamStore::load(f.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_affinity_value() {
        let yaml = "alpha: 1.0\nbeta: 1.0\naffinity:\n  cpu-light:\n    node: 11.0\n";
        let f = yaml_tempfile(yaml);
        assert!(ParamStore::load(f.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_penalty_value() {
        let yaml = "alpha: 1.0\nbeta: 1.0\npenalty:\n  w1: 500.0\n";
        let f = yaml_tempfile(yaml);
        assert!(ParamStore::load(f.path()).is_err());
    }

    #[test]
    fn missing_file_fails_initial_load() {
        assert!(ParamStore::load("/nonexistent/params.yaml").is_err());
    }

    #[test]
    fn reload_keeps_previous_snapshot_on_invalid_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"alpha: 1.0\nbeta: 1.0\n").unwrap();
        let store = ParamStore::load(f.path()).unwrap();
        assert_eq!(store.current().alpha, 1.0);

        // Overwrite with invalid content and reload.
        std::fs::write(f.path(), "alpha: 1.0\nbeta: -1.0\n").unwrap();
        store.reload();
        assert_eq!(store.current().alpha, 1.0, "previous snapshot must survive a bad reload");
    }

    #[test]
    fn reload_picks_up_valid_changes() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"alpha: 1.0\nbeta: 1.0\n").unwrap();
        let store = ParamStore::load(f.path()).unwrap();

        std::fs::write(f.path(), "alpha: 9.0\nbeta: 1.0\n").unwrap();
        store.reload();
        assert_eq!(store.current().alpha, 9.0);
    }
}
