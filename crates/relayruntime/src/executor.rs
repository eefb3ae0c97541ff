use crate::graph::ExecutionPlan;
use crate::proxy::{InvokeRequest, PluginInvoker};
use crate::resolver::{BindingTable, ProcessorResolver, ResolvedProcessor};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use relaycore::{
    EventBus, ExecutionContext, ExecutionEvent, NodeError, NodeId, NodeReport, NodeResult,
    NodeSpec, Payload, ProcessorBinding, ProcessorContext, RunOutcome, RunStatus, SkipReason,
    Workflow, WorkflowError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Running,
    Done,
}

/// Executes workflows as DAGs with bounded parallelism.
///
/// A node runs once all of its upstream nodes succeeded. A node with a
/// failed or skipped upstream is skipped without being invoked. Branches
/// that share no ancestry with a failure are not affected by it.
pub struct WorkflowExecutor {
    max_parallel: usize,
    resolver: ProcessorResolver,
    invoker: Arc<dyn PluginInvoker>,
}

impl WorkflowExecutor {
    pub fn new(
        max_parallel: usize,
        resolver: ProcessorResolver,
        invoker: Arc<dyn PluginInvoker>,
    ) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            resolver,
            invoker,
        }
    }

    pub fn resolver(&self) -> &ProcessorResolver {
        &self.resolver
    }

    /// Execute a workflow to completion.
    ///
    /// Graph-level problems are returned as errors before any node runs.
    /// Everything node-local ends up in the returned outcome.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        event_bus: &EventBus,
        input: Payload,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        let plan = ExecutionPlan::build(workflow)?;
        let mut ctx = ExecutionContext::new(input);
        let execution_id = ctx.execution_id;
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            workflow_id: workflow.id.clone(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            execution_id = %execution_id,
            "Starting workflow '{}' ({} nodes)",
            workflow.name,
            plan.len()
        );

        // Resolved once; never re-resolved during the run
        let mut resolutions = self.resolver.resolve_all(workflow);
        let bindings: HashMap<NodeId, ProcessorBinding> = resolutions
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|r| (id.clone(), r.binding())))
            .collect();

        let max_parallel = workflow
            .settings
            .max_parallel_nodes
            .map(|n| n.clamp(1, self.max_parallel))
            .unwrap_or(self.max_parallel);

        let mut run = RunState {
            workflow,
            plan: &plan,
            event_bus,
            specs: workflow.nodes.iter().map(|n| (n.node_id.clone(), n)).collect(),
            states: plan
                .order()
                .iter()
                .map(|id| (id.clone(), NodeState::Pending))
                .collect(),
            durations: HashMap::new(),
        };

        let cancelled = self
            .execute_dag(&mut run, &mut ctx, &mut resolutions, max_parallel, &cancel)
            .await;

        let durations = std::mem::take(&mut run.durations);
        let started_at = ctx.started_at;
        let results = ctx.into_results();
        let status = RunStatus::aggregate(results.values(), cancelled);
        let duration_ms = start_time.elapsed().as_millis() as u64;

        let nodes: BTreeMap<NodeId, NodeReport> = results
            .into_iter()
            .map(|(id, result)| {
                let report = NodeReport {
                    binding: bindings.get(&id).cloned(),
                    duration_ms: durations.get(&id).copied(),
                    result,
                };
                (id, report)
            })
            .collect();

        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            status,
            cancelled,
            duration_ms,
            timestamp: Utc::now(),
        });

        tracing::info!(
            execution_id = %execution_id,
            "Workflow '{}' finished: {} in {}ms",
            workflow.name,
            status,
            duration_ms
        );

        Ok(RunOutcome {
            execution_id,
            workflow_id: workflow.id.clone(),
            status,
            cancelled,
            started_at,
            duration_ms,
            nodes,
        })
    }

    /// Drive the DAG until every node is terminal. Returns whether the run
    /// was cancelled.
    ///
    /// This loop is the only writer of the context: a result is recorded and
    /// readiness recomputed in the same step, so a dependent never starts
    /// before its upstream output is visible.
    async fn execute_dag(
        &self,
        run: &mut RunState<'_>,
        ctx: &mut ExecutionContext,
        resolutions: &mut BindingTable,
        max_parallel: usize,
        cancel: &CancellationToken,
    ) -> bool {
        let plan = run.plan;
        let mut running = FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            // A cancel that lands after the last node settled changes nothing
            if !cancelled && cancel.is_cancelled() && run.is_unfinished(running.len()) {
                tracing::warn!(execution_id = %ctx.execution_id, "Run cancelled");
                cancelled = true;
            }

            // One pass in topological order settles every node that can be
            // settled without waiting, since upstreams are visited first.
            for node_id in plan.order() {
                if run.states.get(node_id) != Some(&NodeState::Pending) {
                    continue;
                }

                if cancelled {
                    run.skip(ctx, node_id, SkipReason::Cancelled);
                    continue;
                }

                let upstream = plan.upstream(node_id);
                if let Some(blocker) = upstream
                    .iter()
                    .find(|id| ctx.get(id).map(|r| !r.is_success()).unwrap_or(false))
                {
                    let reason = SkipReason::UpstreamFailed {
                        upstream: blocker.clone(),
                    };
                    run.skip(ctx, node_id, reason);
                    continue;
                }

                let ready = upstream
                    .iter()
                    .all(|id| ctx.get(id).map(NodeResult::is_success).unwrap_or(false));
                if !ready || running.len() >= max_parallel {
                    continue;
                }

                let resolved = match resolutions.remove(node_id) {
                    Some(Ok(resolved)) => resolved,
                    Some(Err(e)) => {
                        run.fail(ctx, node_id, &e);
                        continue;
                    }
                    None => {
                        let e = NodeError::ExecutionFailed("node was never resolved".to_string());
                        run.fail(ctx, node_id, &e);
                        continue;
                    }
                };

                let task = self.dispatch(run, ctx, node_id, &upstream, resolved, cancel);
                let handle = tokio::spawn(async move {
                    let start = Instant::now();
                    let result = task.await;
                    (result, start.elapsed().as_millis() as u64)
                });
                let node_id = node_id.clone();
                running.push(async move { (node_id, handle.await) });
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                Some((node_id, joined)) = running.next() => {
                    let (result, duration_ms) = match joined {
                        Ok((result, duration_ms)) => (result, Some(duration_ms)),
                        Err(e) => (
                            Err(NodeError::ExecutionFailed(format!("processor task aborted: {}", e))),
                            None,
                        ),
                    };
                    run.complete(ctx, &node_id, result, duration_ms);
                }
                _ = cancel.cancelled(), if !cancelled => {}
            }
        }

        cancelled
    }

    /// Build the future that executes one ready node on its resolved tier.
    fn dispatch(
        &self,
        run: &mut RunState<'_>,
        ctx: &ExecutionContext,
        node_id: &NodeId,
        upstream: &[NodeId],
        resolved: ResolvedProcessor,
        cancel: &CancellationToken,
    ) -> BoxFuture<'static, Result<Payload, NodeError>> {
        let (input, upstream_outputs) = ctx.assemble_input(upstream);
        let spec = run.specs.get(node_id).copied();
        let node_name = spec
            .map(|s| s.display_name().to_string())
            .unwrap_or_else(|| node_id.clone());
        let config = spec.map(|s| s.config.clone()).unwrap_or_default();

        run.states.insert(node_id.clone(), NodeState::Running);
        run.event_bus.emit(ExecutionEvent::NodeStarted {
            execution_id: ctx.execution_id,
            node_id: node_id.clone(),
            binding: resolved.binding(),
            timestamp: Utc::now(),
        });
        tracing::info!(node_id = %node_id, binding = %resolved.binding(), "Dispatching node");

        match resolved {
            ResolvedProcessor::Core { processor, .. } => {
                let pctx = ProcessorContext {
                    node_id: node_id.clone(),
                    node_name,
                    execution_id: ctx.execution_id,
                    started_at: ctx.started_at,
                    input,
                    upstream: upstream_outputs,
                    config,
                    events: run.event_bus.create_emitter(ctx.execution_id, node_id.clone()),
                    cancellation: cancel.child_token(),
                };
                let work = async move {
                    processor.validate_config(&pctx.config)?;
                    processor.execute(pctx).await
                }
                .boxed();
                // Core processors may block; keep them off the scheduling thread
                let runtime = tokio::runtime::Handle::current();
                async move {
                    tokio::task::spawn_blocking(move || runtime.block_on(work))
                        .await
                        .unwrap_or_else(|e| {
                            Err(NodeError::ExecutionFailed(format!(
                                "processor task aborted: {}",
                                e
                            )))
                        })
                }
                .boxed()
            }
            ResolvedProcessor::Business(binding) => {
                let invoker = self.invoker.clone();
                let token = cancel.child_token();
                let request = InvokeRequest {
                    node_id: node_id.clone(),
                    node_name,
                    execution_id: ctx.execution_id,
                    inputs: input,
                    config,
                };
                async move {
                    invoker
                        .invoke(&binding, &request, &token)
                        .await
                        .map_err(NodeError::from)
                }
                .boxed()
            }
        }
    }
}

/// Bookkeeping of one run, owned by the scheduling loop.
struct RunState<'a> {
    workflow: &'a Workflow,
    plan: &'a ExecutionPlan,
    event_bus: &'a EventBus,
    specs: HashMap<NodeId, &'a NodeSpec>,
    states: HashMap<NodeId, NodeState>,
    durations: HashMap<NodeId, u64>,
}

impl RunState<'_> {
    /// Whether any node is still pending or in flight.
    fn is_unfinished(&self, in_flight: usize) -> bool {
        in_flight > 0 || self.states.values().any(|s| *s == NodeState::Pending)
    }

    fn skip(&mut self, ctx: &mut ExecutionContext, node_id: &NodeId, reason: SkipReason) {
        tracing::info!(node_id = %node_id, "Skipping node: {}", reason);
        self.event_bus.emit(ExecutionEvent::NodeSkipped {
            execution_id: ctx.execution_id,
            node_id: node_id.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        ctx.record(node_id.clone(), NodeResult::Skipped { reason });
        self.states.insert(node_id.clone(), NodeState::Done);
    }

    fn fail(&mut self, ctx: &mut ExecutionContext, node_id: &NodeId, error: &NodeError) {
        tracing::error!(
            node_id = %node_id,
            kind = %error.kind(),
            workflow = %self.workflow.name,
            "Node {} failed: {}",
            node_id,
            error
        );
        self.event_bus.emit(ExecutionEvent::NodeFailed {
            execution_id: ctx.execution_id,
            node_id: node_id.clone(),
            kind: error.kind(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        ctx.record(node_id.clone(), NodeResult::failed(error));
        self.states.insert(node_id.clone(), NodeState::Done);
    }

    fn complete(
        &mut self,
        ctx: &mut ExecutionContext,
        node_id: &NodeId,
        result: Result<Payload, NodeError>,
        duration_ms: Option<u64>,
    ) {
        if let Some(ms) = duration_ms {
            self.durations.insert(node_id.clone(), ms);
        }

        match result {
            Ok(output) => {
                tracing::info!(
                    node_id = %node_id,
                    "Node {} completed in {}ms",
                    node_id,
                    duration_ms.unwrap_or(0)
                );
                self.event_bus.emit(ExecutionEvent::NodeSucceeded {
                    execution_id: ctx.execution_id,
                    node_id: node_id.clone(),
                    duration_ms: duration_ms.unwrap_or(0),
                    timestamp: Utc::now(),
                });
                ctx.record(node_id.clone(), NodeResult::Success { output });
                self.states.insert(node_id.clone(), NodeState::Done);
            }
            Err(e) => self.fail(ctx, node_id, &e),
        }
    }
}
