//! The aggregation interpreter.
//!
//! Executes aggregation values: resolves references, applies the built-in
//! control operators under the reserved `client` namespace, and dispatches
//! every other procedure path through the registry. Recursion is expected —
//! an aggregation's step may itself dispatch to another aggregation — so
//! nesting depth is bounded and recursive calls go through boxed futures.

use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::context::{truthy, ExecutionContext};
use crate::error::{FlowError, FlowResult};
use crate::registry::{HandlerFuture, ProcedureKind, ProcedureRegistry};
use crate::resolve::resolve_input;
use crate::value::{is_step, StepDef, WhenTag, MAP_ITEM_KEY};

/// Bound on aggregation operator nesting. Stack depth is proportional to
/// nesting, not to step count, so this is generous.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Handle passed to native handlers for recursive invocation.
#[derive(Clone)]
pub struct CallContext {
    interpreter: Interpreter,
    depth: usize,
}

impl CallContext {
    /// Invoke another procedure from inside a handler.
    pub async fn call(&self, path: &str, input: Value) -> FlowResult<Value> {
        self.interpreter
            .dispatch(path.to_string(), input, self.depth + 1)
            .await
    }

    /// Run a per-node visit: either a procedure path or a deferred step
    /// (`when = "parent"`), with `defaults` overlaid onto the call's input
    /// for any key the step leaves implicit (this is how `cwd` is
    /// specialized per node). Anything else is a reference-rule violation.
    pub async fn call_deferred(&self, visit: &Value, defaults: Value) -> FlowResult<Value> {
        self.interpreter
            .call_deferred_at(visit, defaults, self.depth + 1)
            .await
    }
}

/// Executes aggregations against a shared registry.
#[derive(Clone)]
pub struct Interpreter {
    registry: Arc<ProcedureRegistry>,
}

impl Interpreter {
    pub fn new(registry: Arc<ProcedureRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProcedureRegistry> {
        &self.registry
    }

    /// Invoke a procedure path with a concrete input.
    pub async fn call(&self, path: &str, input: Value) -> FlowResult<Value> {
        self.dispatch(path.to_string(), input, 0).await
    }

    /// See [`CallContext::call_deferred`].
    pub async fn call_deferred(&self, visit: &Value, defaults: Value) -> FlowResult<Value> {
        self.call_deferred_at(visit, defaults, 0).await
    }

    async fn call_deferred_at(
        &self,
        visit: &Value,
        defaults: Value,
        depth: usize,
    ) -> FlowResult<Value> {
        match visit {
            Value::String(path) => self.dispatch(path.clone(), defaults, depth).await,
            step_value if is_step(step_value) => {
                let step = StepDef::from_value(step_value)?;
                if !matches!(step.when, WhenTag::Parent | WhenTag::Immediate) {
                    return Err(FlowError::RefRuleViolation {
                        detail: format!(
                            "deferred step for {} must be scheduled for the parent",
                            step.proc_path
                        ),
                    });
                }
                // Resolve the step's own input against the per-node
                // defaults, then overlay defaults for keys left implicit.
                let ctx = ExecutionContext::root(defaults.clone());
                let resolved = resolve_input(&step.input, &ctx);
                let merged = overlay_defaults(resolved, &defaults);
                self.dispatch(step.proc_path, merged, depth).await
            }
            other => Err(FlowError::RefRuleViolation {
                detail: format!("visit must be a procedure path or a step, got {other}"),
            }),
        }
    }

    /// Resolve a path to its procedure and run it. Boxed: this is the knot
    /// that ties recursive aggregation execution together.
    fn dispatch(&self, path: String, input: Value, depth: usize) -> HandlerFuture {
        let this = self.clone();
        Box::pin(async move {
            if depth >= MAX_NESTING_DEPTH {
                return Err(FlowError::AggregationTooDeep {
                    max_depth: MAX_NESTING_DEPTH,
                });
            }
            debug!(%path, depth, "dispatch");

            // Control operators invoked directly by path get a fresh
            // context rooted at their (already concrete) input.
            if let Some(op) = path.strip_prefix("client.") {
                let mut ctx = ExecutionContext::root(input.clone());
                return this
                    .execute_control(op.to_string(), input, &mut ctx, depth)
                    .await;
            }

            let record =
                this.registry
                    .get(&path)
                    .ok_or_else(|| FlowError::ProcedureNotFound {
                        path: path.clone(),
                    })?;
            match record.kind {
                ProcedureKind::Handler(handler) => {
                    let ctx = CallContext {
                        interpreter: this.clone(),
                        depth,
                    };
                    handler(input, ctx).await
                }
                ProcedureKind::Aggregation(aggregation) => {
                    let mut ctx = ExecutionContext::root(input);
                    this.execute_value(aggregation, &mut ctx, depth + 1).await
                }
            }
        })
    }

    /// Execute one aggregation value: a step runs, anything else resolves
    /// to itself. Boxed so control operators can recurse through it.
    fn execute_value<'a>(
        &'a self,
        value: Value,
        ctx: &'a mut ExecutionContext,
        depth: usize,
    ) -> Pin<Box<dyn std::future::Future<Output = FlowResult<Value>> + Send + 'a>> {
        Box::pin(async move {
            if depth >= MAX_NESTING_DEPTH {
                return Err(FlowError::AggregationTooDeep {
                    max_depth: MAX_NESTING_DEPTH,
                });
            }
            if is_step(&value) {
                self.execute_step(value, ctx, depth).await
            } else {
                Ok(resolve_input(&value, ctx))
            }
        })
    }

    async fn execute_step(
        &self,
        raw: Value,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> FlowResult<Value> {
        let step = StepDef::from_value(&raw)?;

        // Non-immediate steps are values, not work: the parent procedure
        // (or nobody) executes them.
        if step.when != WhenTag::Immediate {
            return Ok(raw);
        }

        let resolved = resolve_input(&step.input, ctx);

        let result = if let Some(op) = step.proc_path.strip_prefix("client.") {
            self.execute_control(op.to_string(), resolved, ctx, depth)
                .await?
        } else {
            self.dispatch(step.proc_path.clone(), resolved, depth + 1)
                .await?
        };

        if let Some(name) = &step.name {
            ctx.bind(name.clone(), result.clone());
        }
        Ok(result)
    }

    async fn execute_control(
        &self,
        op: String,
        input: Value,
        ctx: &mut ExecutionContext,
        depth: usize,
    ) -> FlowResult<Value> {
        match op.as_str() {
            // Returns its input unchanged; used to assemble result values.
            "identity" => Ok(input),

            // Sequential execution; each step sees the accumulated context;
            // returns the last step's result.
            "chain" => {
                let steps = input
                    .get("steps")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let mut last = Value::Null;
                for step in steps {
                    last = self.execute_value(step, ctx, depth + 1).await?;
                }
                Ok(last)
            }

            // Concurrent tasks, results in task order. A task failure
            // surfaces as the first failing task's error — after every
            // sibling has settled.
            "parallel" => {
                let tasks = input
                    .get("tasks")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                let mut handles = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let this = self.clone();
                    let mut task_ctx = ctx.clone();
                    handles.push(tokio::spawn(async move {
                        this.execute_value(task, &mut task_ctx, depth + 1).await
                    }));
                }

                let mut results = Vec::with_capacity(handles.len());
                let mut first_error = None;
                for handle in handles {
                    match handle.await {
                        Ok(Ok(value)) => results.push(value),
                        Ok(Err(e)) => {
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                        Err(join_err) => {
                            if first_error.is_none() {
                                first_error = Some(FlowError::failed("client.parallel", join_err));
                            }
                        }
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(Value::Array(results)),
                }
            }

            // Branch absence means no step runs and the result is the
            // unresolved marker.
            "conditional" => {
                let condition = input.get("condition").cloned().unwrap_or(Value::Null);
                let branch = if truthy(&condition) {
                    input.get("then")
                } else {
                    input.get("else")
                };
                match branch {
                    Some(branch) => self.execute_value(branch.clone(), ctx, depth + 1).await,
                    None => Ok(Value::Null),
                }
            }

            // Swallows the try error; catch is executed when it is a step,
            // otherwise resolved as a plain value.
            "tryCatch" => {
                let try_value = input
                    .get("try")
                    .cloned()
                    .ok_or_else(|| FlowError::InvalidStep {
                        detail: "tryCatch requires a try value".to_string(),
                    })?;
                match self.execute_value(try_value, ctx, depth + 1).await {
                    Ok(value) => Ok(value),
                    Err(caught) => {
                        debug!(error = %caught, "tryCatch swallowed");
                        match input.get("catch") {
                            Some(catch) => {
                                self.execute_value(catch.clone(), ctx, depth + 1).await
                            }
                            None => Ok(Value::Null),
                        }
                    }
                }
            }

            // Sequential, order-preserving. Each element binds under the
            // well-known `item` key, overwritten per iteration.
            "map" => {
                let items = input
                    .get("items")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| FlowError::InvalidStep {
                        detail: "map items must be a sequence".to_string(),
                    })?;
                let mapper = input
                    .get("mapper")
                    .cloned()
                    .ok_or_else(|| FlowError::InvalidStep {
                        detail: "map requires a mapper".to_string(),
                    })?;

                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    ctx.bind(MAP_ITEM_KEY, item);
                    results.push(self.execute_value(mapper.clone(), ctx, depth + 1).await?);
                }
                Ok(Value::Array(results))
            }

            "throw" => {
                let message = match input.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "aggregation raised".to_string(),
                };
                Err(FlowError::Thrown { message })
            }

            other => Err(FlowError::ProcedureNotFound {
                path: format!("client.{other}"),
            }),
        }
    }
}

/// Overlay `defaults` entries onto `input` for keys the input leaves
/// implicit. Non-mapping inputs are replaced by the defaults wholesale.
fn overlay_defaults(input: Value, defaults: &Value) -> Value {
    match (input, defaults) {
        (Value::Object(mut obj), Value::Object(defaults)) => {
            for (key, value) in defaults {
                obj.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Value::Object(obj)
        }
        (Value::Null, defaults) => defaults.clone(),
        (input, _) => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{handler, RegisterOptions};
    use crate::value::{named_step, reference, step, step_when};
    use serde_json::json;
    use std::sync::Mutex;

    fn setup() -> (Interpreter, Arc<Mutex<Vec<(String, Value)>>>) {
        let registry = Arc::new(ProcedureRegistry::new());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let record = Arc::clone(&calls);
        registry
            .register_handler(
                "mock.echo",
                handler(move |input, _| {
                    record.lock().unwrap().push(("mock.echo".to_string(), input.clone()));
                    async move { Ok(input) }
                }),
                RegisterOptions::default(),
            )
            .unwrap();

        registry
            .register_handler(
                "mock.fail",
                handler(|_, _| async {
                    Err(FlowError::failed("mock.fail", "scripted failure"))
                }),
                RegisterOptions::default(),
            )
            .unwrap();

        (Interpreter::new(registry), calls)
    }

    #[tokio::test]
    async fn test_identity_returns_resolved_input() {
        let (interp, _) = setup();
        let out = interp
            .call("client.identity", json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(out, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_chain_threads_named_results() {
        let (interp, calls) = setup();
        let agg = step(
            "client.chain",
            json!({
                "steps": [
                    named_step("first", "mock.echo", json!({"cwd": reference("input.cwd")})),
                    step("client.identity", json!({"got": reference("first.cwd")})),
                ]
            }),
        );
        let registry = Arc::clone(interp.registry());
        registry
            .register_aggregation("test.chain", agg, RegisterOptions::default())
            .unwrap();

        let out = interp.call("test.chain", json!({"cwd": "/p"})).await.unwrap();
        assert_eq!(out, json!({"got": "/p"}));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_executes_matching_branch_only() {
        let (interp, calls) = setup();
        let agg = step(
            "client.conditional",
            json!({
                "condition": reference("input.force"),
                "then": step("mock.echo", json!({"branch": "then"})),
            }),
        );
        let registry = Arc::clone(interp.registry());
        registry
            .register_aggregation("test.cond", agg, RegisterOptions::default())
            .unwrap();

        let out = interp.call("test.cond", json!({"force": true})).await.unwrap();
        assert_eq!(out, json!({"branch": "then"}));
        assert_eq!(calls.lock().unwrap().len(), 1);

        let out = interp.call("test.cond", json!({"force": false})).await.unwrap();
        assert_eq!(out, Value::Null, "absent branch yields the unresolved marker");
        assert_eq!(calls.lock().unwrap().len(), 1, "no extra call");
    }

    #[tokio::test]
    async fn test_try_catch_swallows_and_substitutes() {
        let (interp, _) = setup();
        let out = interp
            .call(
                "client.tryCatch",
                json!({
                    "try": step("mock.fail", Value::Null),
                    "catch": {"removed": false},
                }),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"removed": false}));
    }

    #[tokio::test]
    async fn test_map_binds_item_in_order() {
        let (interp, _) = setup();
        let out = interp
            .call(
                "client.map",
                json!({
                    "items": ["a", "b", "c"],
                    "mapper": step("client.identity", json!({"saw": reference("item")})),
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            json!([{"saw": "a"}, {"saw": "b"}, {"saw": "c"}])
        );
    }

    #[tokio::test]
    async fn test_parallel_settles_all_then_reports_first_failure() {
        let (interp, calls) = setup();
        let result = interp
            .call(
                "client.parallel",
                json!({
                    "tasks": [
                        step("mock.echo", json!({"t": 1})),
                        step("mock.fail", Value::Null),
                        step("mock.echo", json!({"t": 3})),
                    ]
                }),
            )
            .await;

        assert!(matches!(
            result,
            Err(FlowError::ProcedureFailed { .. })
        ));
        // Siblings settled: both echo tasks ran.
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_throw_raises_templated_message() {
        let (interp, _) = setup();
        let agg = step(
            "client.throw",
            json!({"message": "install failed in {{input.cwd}}"}),
        );
        let registry = Arc::clone(interp.registry());
        registry
            .register_aggregation("test.throw", agg, RegisterOptions::default())
            .unwrap();

        let err = interp.call("test.throw", json!({"cwd": "/p"})).await.unwrap_err();
        assert_eq!(err.to_string(), "install failed in /p");
    }

    #[tokio::test]
    async fn test_unknown_procedure_path() {
        let (interp, _) = setup();
        let err = interp.call("no.such.proc", Value::Null).await.unwrap_err();
        assert!(matches!(err, FlowError::ProcedureNotFound { .. }));
    }

    #[tokio::test]
    async fn test_depth_bound_surfaces_too_deep() {
        let (interp, _) = setup();
        // An aggregation that dispatches to itself never terminates except
        // through the depth bound.
        let registry = Arc::clone(interp.registry());
        registry
            .register_aggregation(
                "test.recurse",
                step("test.recurse", Value::Null),
                RegisterOptions::default(),
            )
            .unwrap();

        let err = interp.call("test.recurse", Value::Null).await.unwrap_err();
        assert!(matches!(err, FlowError::AggregationTooDeep { .. }));
    }

    #[tokio::test]
    async fn test_non_immediate_step_passes_through() {
        let (interp, calls) = setup();
        let deferred = step_when("mock.echo", json!({"x": 1}), "never");
        let agg = step("client.chain", json!({"steps": [deferred.clone()]}));
        let registry = Arc::clone(interp.registry());
        registry
            .register_aggregation("test.deferred", agg, RegisterOptions::default())
            .unwrap();

        let out = interp.call("test.deferred", Value::Null).await.unwrap();
        assert_eq!(out, deferred, "step value passes through unevaluated");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_deferred_overlays_cwd() {
        let (interp, calls) = setup();

        // As a bare procedure path.
        interp
            .call_deferred(&json!("mock.echo"), json!({"cwd": "/node-a"}))
            .await
            .unwrap();

        // As a deferred step with an explicit field and an implicit cwd.
        let visit = step_when("mock.echo", json!({"force": true}), "parent");
        interp
            .call_deferred(&visit, json!({"cwd": "/node-b"}))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1, json!({"cwd": "/node-a"}));
        assert_eq!(calls[1].1, json!({"force": true, "cwd": "/node-b"}));
    }

    #[tokio::test]
    async fn test_call_deferred_rejects_non_step() {
        let (interp, _) = setup();
        let err = interp
            .call_deferred(&json!(42), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::RefRuleViolation { .. }));
    }
}
