//! DAG executor: runs the plan's steps with dependency, parallel-group,
//! retry, breaker, and cancellation semantics.
//!
//! The step graph is validated first (unique ids, known dependencies, acyclic);
//! a bad graph fails the request with `validation.status = error` and no step
//! runs. Execution then advances a frontier: a step is ready once all of its
//! `depends_on` have finished, successfully or not. Ready steps sharing a
//! `parallel_group` label fan out onto tasks and are joined; unlabeled ready
//! steps run sequentially in plan order. At launch, `$ref` params are resolved
//! from the producing step's envelope; an unresolved reference substitutes an
//! empty value and surfaces a warning, and the step still runs.

pub mod breaker;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use env_config::Settings;

use crate::error::AgentError;
use crate::graph::Node;
use crate::metrics::{NODE_INVOCATIONS, NODE_LATENCY, TOOL_INVOCATIONS, TOOL_LATENCY};
use crate::state::{
    ParamValue, RequestState, Step, ToolEnvelope, ToolKind, Validation, ValidationStatus,
    ERR_CANCELLED, ERR_CIRCUIT_BREAKER_OPEN, ERR_UNAUTHORIZED,
};
use crate::tools::{ResolvedParams, ToolRegistry};

use breaker::CircuitBreaker;

const NODE_NAME: &str = "executor";

/// Executor node: plan in, envelopes out.
pub struct ExecutorNode {
    tools: Arc<ToolRegistry>,
    breaker: Arc<CircuitBreaker>,
    settings: Arc<Settings>,
    /// Per-tool concurrency ceiling.
    semaphores: HashMap<ToolKind, Arc<tokio::sync::Semaphore>>,
}

impl ExecutorNode {
    pub fn new(
        tools: Arc<ToolRegistry>,
        breaker: Arc<CircuitBreaker>,
        settings: Arc<Settings>,
    ) -> Self {
        let semaphores = ToolKind::fallback_order()
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    Arc::new(tokio::sync::Semaphore::new(settings.tool_concurrency.max(1))),
                )
            })
            .collect();
        Self {
            tools,
            breaker,
            settings,
            semaphores,
        }
    }

    /// Checks unique ids, known dependencies, and acyclicity (Kahn). Returns the
    /// violation message if the graph is unusable.
    fn validate_graph(steps: &[Step]) -> Result<(), String> {
        let mut ids = HashSet::new();
        for step in steps {
            if !ids.insert(step.id.as_str()) {
                return Err(format!("duplicate step id: {}", step.id));
            }
        }
        for step in steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    ));
                }
            }
        }

        // Kahn's algorithm over the dependency edges.
        let mut in_degree: HashMap<&str, usize> = steps
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in steps {
            for dep in &step.depends_on {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(step.id.as_str());
            }
        }
        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            for dependent in dependents.get(id).into_iter().flatten() {
                let degree = in_degree.get_mut(dependent).expect("known id");
                *degree -= 1;
                if *degree == 0 {
                    queue.push(dependent);
                }
            }
        }
        if visited != steps.len() {
            return Err("plan dependency graph contains a cycle".to_string());
        }
        Ok(())
    }

    /// Resolves a step's params against completed step outputs.
    ///
    /// References to a missing step or field substitute an empty list and push a
    /// warning; the step proceeds. Resolved lists are deduplicated preserving
    /// first-seen order (union semantics for duplicated ids).
    fn resolve_params(
        step: &Step,
        outputs: &HashMap<String, ToolEnvelope>,
        warnings: &mut Vec<String>,
    ) -> ResolvedParams {
        let mut resolved = ResolvedParams::new();
        for (key, value) in &step.params {
            match value {
                ParamValue::Literal(v) => {
                    resolved.insert(key.clone(), v.clone());
                }
                ParamValue::Ref { step: src, field } => {
                    let found = outputs.get(src).and_then(|env| env.field(field).cloned());
                    match found {
                        Some(serde_json::Value::Array(items)) => {
                            let mut seen = HashSet::new();
                            let deduped: Vec<serde_json::Value> = items
                                .into_iter()
                                .filter(|v| seen.insert(v.to_string()))
                                .collect();
                            resolved.insert(key.clone(), serde_json::Value::Array(deduped));
                        }
                        Some(v) => {
                            resolved.insert(key.clone(), v);
                        }
                        None => {
                            warnings.push(format!(
                                "step {}: unresolved reference {} for param {}; substituted empty value",
                                step.id,
                                ParamValue::ref_token(src, field),
                                key
                            ));
                            resolved.insert(key.clone(), serde_json::Value::Array(Vec::new()));
                        }
                    }
                }
            }
        }
        resolved
    }

    /// Runs one step to an envelope: breaker gate, retry with exponential
    /// backoff, per-tool timeout, and cooperative cancellation.
    async fn execute_step(
        &self,
        step: &Step,
        params: ResolvedParams,
        state: Arc<RequestState>,
    ) -> ToolEnvelope {
        let tool_name = step.tool.as_str();

        if step.tool == ToolKind::Unauthorized {
            TOOL_INVOCATIONS
                .with_label_values(&[tool_name, "skipped"])
                .inc();
            let reason = step
                .error
                .clone()
                .unwrap_or_else(|| ERR_UNAUTHORIZED.to_string());
            return ToolEnvelope::failed(tool_name, reason);
        }

        let Some(tool) = self.tools.get(step.tool) else {
            TOOL_INVOCATIONS
                .with_label_values(&[tool_name, "error"])
                .inc();
            return ToolEnvelope::failed(tool_name, format!("no adapter registered: {}", tool_name));
        };

        let max_attempts = self.settings.tool_retry_max_attempts.max(1);
        let min_wait = Duration::from_millis(self.settings.tool_retry_min_wait_ms);
        let max_wait = Duration::from_millis(
            self.settings
                .tool_retry_max_wait_ms
                .max(self.settings.tool_retry_min_wait_ms),
        );
        let timeout = Duration::from_secs(self.settings.tool_timeout_secs);

        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if self.breaker.is_open(tool_name) {
                info!(tool = tool_name, step = %step.id, "tool skipped: circuit breaker open");
                TOOL_INVOCATIONS
                    .with_label_values(&[tool_name, "skipped"])
                    .inc();
                return ToolEnvelope::failed(tool_name, ERR_CIRCUIT_BREAKER_OPEN);
            }

            let permit = match self.semaphores.get(&step.tool) {
                Some(sem) => sem.clone().acquire_owned().await.ok(),
                None => None,
            };

            let outcome = tokio::select! {
                _ = state.cancel.cancelled() => {
                    drop(permit);
                    TOOL_INVOCATIONS
                        .with_label_values(&[tool_name, "skipped"])
                        .inc();
                    return ToolEnvelope::failed(tool_name, ERR_CANCELLED);
                }
                result = tokio::time::timeout(timeout, tool.call(&params, &state)) => result,
            };
            drop(permit);

            match outcome {
                Ok(Ok(envelope)) => {
                    self.breaker.record_success(tool_name);
                    TOOL_INVOCATIONS
                        .with_label_values(&[tool_name, "ok"])
                        .inc();
                    TOOL_LATENCY
                        .with_label_values(&[tool_name])
                        .observe(started.elapsed().as_secs_f64());
                    return envelope;
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error = format!("timed out after {:?}", timeout);
                }
            }

            self.breaker.record_failure(tool_name);
            warn!(
                tool = tool_name,
                step = %step.id,
                attempt,
                error = %last_error,
                "tool attempt failed"
            );

            if attempt < max_attempts {
                let backoff = min_wait
                    .saturating_mul(1 << (attempt - 1).min(16))
                    .min(max_wait);
                tokio::select! {
                    _ = state.cancel.cancelled() => {
                        TOOL_INVOCATIONS
                            .with_label_values(&[tool_name, "skipped"])
                            .inc();
                        return ToolEnvelope::failed(tool_name, ERR_CANCELLED);
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        TOOL_INVOCATIONS
            .with_label_values(&[tool_name, "error"])
            .inc();
        TOOL_LATENCY
            .with_label_values(&[tool_name])
            .observe(started.elapsed().as_secs_f64());
        ToolEnvelope::failed(tool_name, last_error)
    }
}

#[async_trait]
impl Node<RequestState> for ExecutorNode {
    fn id(&self) -> &str {
        NODE_NAME
    }

    async fn run(&self, mut state: RequestState) -> Result<RequestState, AgentError> {
        let start = Instant::now();
        let steps = state.plan.steps.clone();

        info!(
            request_id = %state.request_id,
            node = NODE_NAME,
            num_steps = steps.len(),
            "node_start"
        );

        // Fresh slots on every execution (refinement re-runs the plan).
        for kind in ToolKind::fallback_order() {
            if let Some(slot) = state.slot_mut(kind) {
                *slot = None;
            }
        }

        if let Err(violation) = Self::validate_graph(&steps) {
            warn!(request_id = %state.request_id, violation = %violation, "plan graph rejected");
            state.validation = Validation {
                status: ValidationStatus::Error,
                needs_refinement: false,
                warnings: vec![format!("plan rejected: {}", violation)],
            };
            state.partial = true;
            NODE_INVOCATIONS
                .with_label_values(&[NODE_NAME, "error"])
                .inc();
            NODE_LATENCY
                .with_label_values(&[NODE_NAME])
                .observe(start.elapsed().as_secs_f64());
            return Ok(state);
        }

        let mut outputs: HashMap<String, ToolEnvelope> = HashMap::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut ref_warnings: Vec<String> = Vec::new();
        let mut pending: Vec<Step> = steps;

        while !pending.is_empty() {
            let (ready, rest): (Vec<Step>, Vec<Step>) = pending
                .into_iter()
                .partition(|s| s.depends_on.iter().all(|d| completed.contains(d)));
            pending = rest;
            if ready.is_empty() {
                // Unreachable after acyclicity validation; guards against a logic bug.
                return Err(AgentError::Graph(
                    "executor frontier stalled with pending steps".to_string(),
                ));
            }

            let snapshot = Arc::new(state.clone());

            // Labeled siblings fan out; group order follows first appearance.
            let mut group_order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Vec<Step>> = HashMap::new();
            let mut singles: Vec<Step> = Vec::new();
            for step in ready {
                match &step.parallel_group {
                    Some(label) => {
                        if !groups.contains_key(label) {
                            group_order.push(label.clone());
                        }
                        groups.entry(label.clone()).or_default().push(step);
                    }
                    None => singles.push(step),
                }
            }

            let mut wave_results: Vec<(Step, ToolEnvelope)> = Vec::new();

            for label in group_order {
                let members = groups.remove(&label).unwrap_or_default();
                let mut handles = Vec::with_capacity(members.len());
                for step in members {
                    let params = Self::resolve_params(&step, &outputs, &mut ref_warnings);
                    handles.push(async {
                        let envelope = self
                            .execute_step(&step, params, snapshot.clone())
                            .await;
                        (step, envelope)
                    });
                }
                let joined = futures::future::join_all(handles).await;
                wave_results.extend(joined);
            }

            for step in singles {
                let params = Self::resolve_params(&step, &outputs, &mut ref_warnings);
                let envelope = self.execute_step(&step, params, snapshot.clone()).await;
                wave_results.push((step, envelope));
            }

            for (step, envelope) in wave_results {
                completed.insert(step.id.clone());
                if let Some(slot) = state.slot_mut(step.tool) {
                    *slot = Some(envelope.clone());
                }
                outputs.insert(step.id, envelope);
            }
        }

        state.validation.warnings.extend(ref_warnings);

        NODE_INVOCATIONS.with_label_values(&[NODE_NAME, "ok"]).inc();
        NODE_LATENCY
            .with_label_values(&[NODE_NAME])
            .observe(start.elapsed().as_secs_f64());
        info!(
            request_id = %state.request_id,
            completed = completed.len(),
            "node_end"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Test tool that records the params it saw and can be scripted to fail.
    struct ProbeTool {
        kind: ToolKind,
        fail_times: AtomicU32,
        calls: AtomicU32,
        seen_params: Mutex<Vec<ResolvedParams>>,
        payload: serde_json::Value,
    }

    impl ProbeTool {
        fn new(kind: ToolKind, payload: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_times: AtomicU32::new(0),
                calls: AtomicU32::new(0),
                seen_params: Mutex::new(Vec::new()),
                payload,
            })
        }

        fn failing(kind: ToolKind, times: u32) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_times: AtomicU32::new(times),
                calls: AtomicU32::new(0),
                seen_params: Mutex::new(Vec::new()),
                payload: serde_json::json!({}),
            })
        }
    }

    #[async_trait]
    impl Tool for ProbeTool {
        fn kind(&self) -> ToolKind {
            self.kind
        }

        async fn call(
            &self,
            params: &ResolvedParams,
            _state: &RequestState,
        ) -> Result<ToolEnvelope, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut guard) = self.seen_params.lock() {
                guard.push(params.clone());
            }
            let remaining = self.fail_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_times.store(remaining - 1, Ordering::SeqCst);
                return Err(AgentError::Tool("simulated outage".to_string()));
            }
            Ok(ToolEnvelope::ok(
                self.payload.clone(),
                serde_json::json!({"source": self.kind.as_str()}),
            ))
        }
    }

    fn fast_settings() -> Arc<Settings> {
        Arc::new(Settings {
            tool_retry_max_attempts: 2,
            tool_retry_min_wait_ms: 1,
            tool_retry_max_wait_ms: 2,
            tool_timeout_secs: 5,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout_secs: 60,
            ..Settings::default()
        })
    }

    fn executor_with(
        tools: Vec<Arc<dyn Tool>>,
        settings: Arc<Settings>,
        breaker: Arc<CircuitBreaker>,
    ) -> ExecutorNode {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry = registry.register(tool);
        }
        ExecutorNode::new(Arc::new(registry), breaker, settings)
    }

    fn breaker_from(settings: &Settings) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            settings.breaker_failure_threshold,
            Duration::from_secs(settings.breaker_recovery_timeout_secs),
        ))
    }

    fn ref_step(id: &str, tool: ToolKind, dep: &str, key: &str, field: &str) -> Step {
        let mut step = Step::simple(id, tool);
        step.depends_on = vec![dep.to_string()];
        step.params.insert(
            key.to_string(),
            ParamValue::Ref {
                step: dep.to_string(),
                field: field.to_string(),
            },
        );
        step
    }

    fn state_with_plan(steps: Vec<Step>) -> RequestState {
        let mut state = RequestState::new("q", "req-exec");
        state.plan = crate::state::Plan {
            strategy: "test".into(),
            description: None,
            steps,
            metadata: Default::default(),
        };
        state
    }

    /// **Scenario**: a cyclic plan never runs; the request is marked
    /// validation.status = error with a warning.
    #[tokio::test]
    async fn cyclic_plan_is_rejected() {
        let settings = fast_settings();
        let topo = ProbeTool::new(ToolKind::Topology, serde_json::json!({"paths": []}));
        let executor = executor_with(
            vec![topo.clone()],
            settings.clone(),
            breaker_from(&settings),
        );

        let mut a = Step::simple("a", ToolKind::Topology);
        a.depends_on = vec!["b".into()];
        let mut b = Step::simple("b", ToolKind::Topology);
        b.depends_on = vec!["a".into()];

        let out = executor.run(state_with_plan(vec![a, b])).await.unwrap();
        assert_eq!(out.validation.status, ValidationStatus::Error);
        assert!(out.partial);
        assert_eq!(topo.calls.load(Ordering::SeqCst), 0);
        assert!(out.validation.warnings[0].contains("cycle"));
    }

    /// **Scenario**: duplicate ids and unknown dependencies are rejected the same way.
    #[tokio::test]
    async fn bad_ids_are_rejected() {
        let settings = fast_settings();
        let executor = executor_with(vec![], settings.clone(), breaker_from(&settings));

        let out = executor
            .run(state_with_plan(vec![
                Step::simple("s", ToolKind::Topology),
                Step::simple("s", ToolKind::Inventory),
            ]))
            .await
            .unwrap();
        assert_eq!(out.validation.status, ValidationStatus::Error);

        let mut dangling = Step::simple("s2", ToolKind::Inventory);
        dangling.depends_on = vec!["ghost".into()];
        let out = executor
            .run(state_with_plan(vec![dangling]))
            .await
            .unwrap();
        assert_eq!(out.validation.status, ValidationStatus::Error);
        assert!(out.validation.warnings[0].contains("ghost"));
    }

    /// **Scenario**: `$ref` params resolve to the producing step's output field,
    /// with list union dedup; resolution happens before the consumer launches.
    #[tokio::test]
    async fn refs_resolve_with_dedup() {
        let settings = fast_settings();
        let topo = ProbeTool::new(
            ToolKind::Topology,
            serde_json::json!({"paths": [], "device_ids": ["d1", "d2", "d1", "d3", "d2"]}),
        );
        let outage = ProbeTool::new(ToolKind::Outage, serde_json::json!({"active_alarms": []}));
        let executor = executor_with(
            vec![topo, outage.clone()],
            settings.clone(),
            breaker_from(&settings),
        );

        let steps = vec![
            Step::simple("step_1", ToolKind::Topology),
            ref_step("step_2", ToolKind::Outage, "step_1", "device_ids", "device_ids"),
        ];
        let out = executor.run(state_with_plan(steps)).await.unwrap();

        let seen = outage.seen_params.lock().unwrap();
        assert_eq!(
            seen[0].get("device_ids"),
            Some(&serde_json::json!(["d1", "d2", "d3"]))
        );
        assert!(out.validation.warnings.is_empty());
        assert!(out.outage_data.is_some());
    }

    /// **Scenario**: a reference to a field that does not exist substitutes an
    /// empty value, emits a warning, and the step still runs.
    #[tokio::test]
    async fn unresolved_ref_substitutes_empty_and_warns() {
        let settings = fast_settings();
        let topo = ProbeTool::new(ToolKind::Topology, serde_json::json!({"paths": []}));
        let outage = ProbeTool::new(ToolKind::Outage, serde_json::json!({"active_alarms": []}));
        let executor = executor_with(
            vec![topo, outage.clone()],
            settings.clone(),
            breaker_from(&settings),
        );

        let steps = vec![
            Step::simple("step_1", ToolKind::Topology),
            ref_step("step_2", ToolKind::Outage, "step_1", "circuit_ids", "no_such_field"),
        ];
        let out = executor.run(state_with_plan(steps)).await.unwrap();

        assert_eq!(outage.calls.load(Ordering::SeqCst), 1);
        let seen = outage.seen_params.lock().unwrap();
        assert_eq!(seen[0].get("circuit_ids"), Some(&serde_json::json!([])));
        assert_eq!(out.validation.warnings.len(), 1);
        assert!(out.validation.warnings[0].contains("no_such_field"));
    }

    /// **Scenario**: a transient failure is retried within the attempt budget and
    /// the envelope ends up ok.
    #[tokio::test]
    async fn transient_failure_is_retried() {
        let settings = fast_settings();
        let flaky = ProbeTool::failing(ToolKind::Inventory, 1);
        let executor = executor_with(
            vec![flaky.clone()],
            settings.clone(),
            breaker_from(&settings),
        );

        let out = executor
            .run(state_with_plan(vec![Step::simple("s1", ToolKind::Inventory)]))
            .await
            .unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert!(out.inventory_data.unwrap().error.is_none());
    }

    /// **Scenario**: once consecutive failures reach the threshold the breaker
    /// opens and the next call observes `circuit_breaker_open` without reaching
    /// the tool; dependents still run.
    #[tokio::test]
    async fn breaker_open_skips_tool() {
        let settings = Arc::new(Settings {
            tool_retry_max_attempts: 1,
            tool_retry_min_wait_ms: 1,
            tool_retry_max_wait_ms: 2,
            breaker_failure_threshold: 2,
            ..Settings::default()
        });
        let breaker = breaker_from(&settings);
        let failing = ProbeTool::failing(ToolKind::Outage, 100);
        let topo = ProbeTool::new(ToolKind::Topology, serde_json::json!({"paths": []}));
        let executor = executor_with(
            vec![failing.clone(), topo],
            settings.clone(),
            breaker.clone(),
        );

        // Two runs: each run is one attempt, opening the breaker at the threshold.
        for _ in 0..2 {
            let _ = executor
                .run(state_with_plan(vec![Step::simple("s1", ToolKind::Outage)]))
                .await
                .unwrap();
        }
        assert!(breaker.is_open("outage_tool"));
        let calls_before = failing.calls.load(Ordering::SeqCst);

        let mut dependent = Step::simple("after", ToolKind::Topology);
        dependent.depends_on = vec!["s1".into()];
        let out = executor
            .run(state_with_plan(vec![
                Step::simple("s1", ToolKind::Outage),
                dependent,
            ]))
            .await
            .unwrap();

        assert_eq!(failing.calls.load(Ordering::SeqCst), calls_before);
        assert_eq!(
            out.outage_data.unwrap().error.as_deref(),
            Some(ERR_CIRCUIT_BREAKER_OPEN)
        );
        // Downstream step still ran with whatever data was available.
        assert!(out.topology_data.is_some());
    }

    /// **Scenario**: an unauthorized step (RBAC rewrite) is never executed and its
    /// envelope carries the rejection.
    #[tokio::test]
    async fn unauthorized_step_is_refused() {
        let settings = fast_settings();
        let executor = executor_with(vec![], settings.clone(), breaker_from(&settings));

        let mut step = Step::simple("s1", ToolKind::Unauthorized);
        step.error = Some("UNAUTHORIZED: rbac_level 'read_only' cannot execute reboot_tool".into());
        let out = executor.run(state_with_plan(vec![step])).await.unwrap();

        // Unauthorized has no slot; the run completes without touching any.
        assert!(out.topology_data.is_none());
        assert_eq!(out.validation.status, ValidationStatus::Ok);
    }

    /// **Scenario**: a cancelled request writes `cancelled` envelopes and still
    /// completes the node.
    #[tokio::test]
    async fn cancellation_writes_cancelled_envelopes() {
        let settings = fast_settings();
        let topo = ProbeTool::new(ToolKind::Topology, serde_json::json!({"paths": []}));
        let executor = executor_with(vec![topo], settings.clone(), breaker_from(&settings));

        let mut state = state_with_plan(vec![Step::simple("s1", ToolKind::Topology)]);
        state.cancel.cancel();

        let out = executor.run(state).await.unwrap();
        assert_eq!(
            out.topology_data.unwrap().error.as_deref(),
            Some(ERR_CANCELLED)
        );
    }

    /// **Scenario**: parallel-group siblings run concurrently after their shared
    /// dependency; both complete and land in their slots.
    #[tokio::test]
    async fn parallel_group_fans_out() {
        let settings = fast_settings();
        let topo = ProbeTool::new(
            ToolKind::Topology,
            serde_json::json!({"paths": [], "circuit_ids": ["c1"]}),
        );
        let inventory = ProbeTool::new(ToolKind::Inventory, serde_json::json!({"circuits": []}));
        let outage = ProbeTool::new(ToolKind::Outage, serde_json::json!({"active_alarms": []}));
        let executor = executor_with(
            vec![topo, inventory.clone(), outage.clone()],
            settings.clone(),
            breaker_from(&settings),
        );

        let mut inv = ref_step("step_2", ToolKind::Inventory, "step_1", "circuit_ids", "circuit_ids");
        inv.parallel_group = Some("enrich".into());
        let mut out_step = ref_step("step_3", ToolKind::Outage, "step_1", "circuit_ids", "circuit_ids");
        out_step.parallel_group = Some("enrich".into());

        let out = executor
            .run(state_with_plan(vec![
                Step::simple("step_1", ToolKind::Topology),
                inv,
                out_step,
            ]))
            .await
            .unwrap();

        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outage.calls.load(Ordering::SeqCst), 1);
        assert!(out.inventory_data.is_some());
        assert!(out.outage_data.is_some());
    }
}
