//! Usage store: accumulated model spend plus an append-only per-call log.
//!
//! The checkpoint file holds `{global, users{}, providers{}}`; every completed
//! model call appends one JSONL record. A single async mutex serializes
//! read-modify-write so concurrent requests cannot lose increments.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::AgentError;
use crate::gateway::backends::TokenUsage;

/// One line of the per-call JSONL log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub timestamp: String,
    pub application: String,
    pub user: String,
    pub agent_role: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: f64,
    pub run_id: String,
}

/// Per-model accumulated totals in the checkpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderTotals {
    pub cost: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Checkpoint shape: `{global, users{}, providers{}}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UsageCheckpoint {
    #[serde(default)]
    pub global: f64,
    #[serde(default)]
    pub users: BTreeMap<String, f64>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderTotals>,
}

/// Accumulated-spend reads and usage writes, shared process-wide.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Adds one call's cost to the global, per-user, and per-model totals.
    async fn add_cost(
        &self,
        user_id: &str,
        model: &str,
        cost: f64,
        usage: &TokenUsage,
    ) -> Result<(), AgentError>;

    /// Appends one structured per-call record.
    async fn log_call(&self, entry: &CallLogEntry) -> Result<(), AgentError>;

    /// Accumulated cost for one user (0 when unknown).
    async fn user_cost(&self, user_id: &str) -> f64;

    /// Accumulated global cost.
    async fn global_cost(&self) -> f64;
}

/// File-backed usage store: JSON checkpoint + JSONL call log.
pub struct FileUsageStore {
    checkpoint_path: PathBuf,
    log_path: PathBuf,
    lock: Mutex<()>,
}

impl FileUsageStore {
    pub fn new(checkpoint_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            log_path: log_path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> UsageCheckpoint {
        match std::fs::read_to_string(&self.checkpoint_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => UsageCheckpoint::default(),
        }
    }

    fn save(&self, data: &UsageCheckpoint) -> Result<(), AgentError> {
        let serialized = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.checkpoint_path, serialized)
            .map_err(|e| AgentError::Store(format!("write usage checkpoint: {}", e)))
    }
}

#[async_trait]
impl UsageStore for FileUsageStore {
    async fn add_cost(
        &self,
        user_id: &str,
        model: &str,
        cost: f64,
        usage: &TokenUsage,
    ) -> Result<(), AgentError> {
        if cost <= 0.0 && usage.prompt_tokens == 0 && usage.completion_tokens == 0 {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        let mut data = self.load();

        data.global += cost;
        if !user_id.is_empty() {
            *data.users.entry(user_id.to_string()).or_insert(0.0) += cost;
        }
        let provider = data.providers.entry(model.to_string()).or_default();
        provider.cost += cost;
        provider.prompt_tokens += u64::from(usage.prompt_tokens);
        provider.completion_tokens += u64::from(usage.completion_tokens);

        self.save(&data)?;
        debug!(
            user = user_id,
            model,
            cost,
            global = data.global,
            "usage cost recorded"
        );
        Ok(())
    }

    async fn log_call(&self, entry: &CallLogEntry) -> Result<(), AgentError> {
        let _guard = self.lock.lock().await;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        use std::io::Write;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            error!(error = %e, "failed to write usage call log");
            return Err(AgentError::Store(format!("write usage call log: {}", e)));
        }
        Ok(())
    }

    async fn user_cost(&self, user_id: &str) -> f64 {
        let _guard = self.lock.lock().await;
        self.load().users.get(user_id).copied().unwrap_or(0.0)
    }

    async fn global_cost(&self) -> f64 {
        let _guard = self.lock.lock().await;
        self.load().global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileUsageStore {
        FileUsageStore::new(
            dir.path().join("usage.json"),
            dir.path().join("calls.jsonl"),
        )
    }

    fn usage(p: u32, c: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: p,
            completion_tokens: c,
            total_tokens: p + c,
        }
    }

    /// **Scenario**: global cost is nondecreasing across calls and per-user totals
    /// equal the sum of per-call costs.
    #[tokio::test]
    async fn cost_accumulation_is_monotonic_and_summed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let costs = [0.004, 0.001, 0.0125];
        let mut last_global = 0.0;
        for cost in costs {
            store
                .add_cost("alice", "gpt-4o", cost, &usage(100, 50))
                .await
                .unwrap();
            let global = store.global_cost().await;
            assert!(global >= last_global);
            last_global = global;
        }

        let expected: f64 = costs.iter().sum();
        assert!((store.user_cost("alice").await - expected).abs() < 1e-9);
        assert!((store.global_cost().await - expected).abs() < 1e-9);
        assert_eq!(store.user_cost("bob").await, 0.0);
    }

    /// **Scenario**: zero-cost zero-token calls are not persisted; zero-cost calls
    /// with tokens still update provider totals.
    #[tokio::test]
    async fn zero_cost_handling() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .add_cost("u", "local-model", 0.0, &usage(0, 0))
            .await
            .unwrap();
        assert_eq!(store.global_cost().await, 0.0);
        assert!(!dir.path().join("usage.json").exists());

        store
            .add_cost("u", "local-model", 0.0, &usage(42, 7))
            .await
            .unwrap();
        let data: UsageCheckpoint = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("usage.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(data.providers["local-model"].prompt_tokens, 42);
        assert_eq!(data.providers["local-model"].completion_tokens, 7);
    }

    /// **Scenario**: each log_call appends exactly one JSONL line that parses back.
    #[tokio::test]
    async fn call_log_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for i in 0..3 {
            store
                .log_call(&CallLogEntry {
                    timestamp: "2026-01-01T00:00:00Z".into(),
                    application: "Topology Agent Service".into(),
                    user: "alice".into(),
                    agent_role: "planner".into(),
                    model: "gpt-4o".into(),
                    prompt_tokens: 100 + i,
                    completion_tokens: 10,
                    cost: 0.001,
                    run_id: format!("run-{}", i),
                })
                .await
                .unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("calls.jsonl")).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: CallLogEntry = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(parsed.run_id, "run-2");
        assert_eq!(parsed.prompt_tokens, 102);
    }

    /// **Scenario**: a corrupt checkpoint file degrades to an empty checkpoint
    /// instead of failing reads.
    #[tokio::test]
    async fn corrupt_checkpoint_degrades() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("usage.json"), "{ not json").unwrap();
        let store = store_in(&dir);
        assert_eq!(store.global_cost().await, 0.0);
    }
}
