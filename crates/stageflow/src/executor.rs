//! Execution engine - runs a flow tree on a bounded worker pool

use crate::context::{FlowListener, StageContext};
use crate::flow::FlowNode;
use crate::report::{FlowReport, StatusTracker};
use crate::stage::SharedStage;
use crate::types::{ExecuteOptions, ExecutionStrategy, StageStatus, aggregate_status};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

const TIMED_OUT: &str = "execution timed out";

/// Execute a flow tree
///
/// Parallel nodes fan out over a pool of `opts.jobs` threads and wait for
/// all children; sequential nodes run children in order and stop at the
/// first child that does not succeed. Under
/// [`ExecutionStrategy::CancelOnError`] the first failure stops every
/// stage that has not started yet and, once running stages have returned,
/// compensates the succeeded ones.
///
/// Stage failures are reported in the returned [`FlowReport`]; an `Err`
/// means the engine itself could not run.
pub fn execute(
    flow_id: &str,
    tree: &FlowNode,
    opts: &ExecuteOptions,
    listener: Arc<dyn FlowListener>,
) -> Result<FlowReport> {
    let jobs = opts.jobs.max(1);
    let run = Arc::new(Run {
        flow_id: flow_id.to_string(),
        strategy: opts.strategy,
        jobs,
        tracker: StatusTracker::for_tree(tree),
        aborted: AtomicBool::new(false),
        listener,
    });

    run.listener.on_flow_start(flow_id, tree.stage_count());
    log::debug!("Executing flow {flow_id} with {jobs} workers ({})", opts.strategy);

    let pool = Arc::new(build_pool(jobs)?);
    let mut timed_out = false;

    match opts.timeout {
        None => {
            pool.install(|| run.run_node(tree));
        }
        Some(timeout) => {
            let (tx, rx) = mpsc::channel();
            let worker_run = Arc::clone(&run);
            let worker_tree = tree.clone();
            let worker_pool = Arc::clone(&pool);
            thread::Builder::new()
                .name(format!("stageflow-{flow_id}"))
                .spawn(move || {
                    let status = worker_pool.install(|| worker_run.run_node(&worker_tree));
                    let _ = tx.send(status);
                })
                .context("Failed to spawn flow worker")?;

            match rx.recv_timeout(timeout) {
                Ok(_) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Flow {flow_id} exceeded {}s, stopping new stages",
                        timeout.as_secs_f64()
                    );
                    timed_out = true;
                    run.aborted.store(true, Ordering::SeqCst);
                    if run.tracker.any_in_progress() {
                        let _ = rx.recv_timeout(opts.in_flight_grace);
                    }
                    for stage_id in run.tracker.fail_in_progress(TIMED_OUT) {
                        log::warn!(
                            "Stage {stage_id} still running after grace period, marked failed"
                        );
                        run.listener
                            .on_stage_complete(&stage_id, StageStatus::Failed, Some(TIMED_OUT));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("Flow worker for {flow_id} terminated unexpectedly");
                }
            }
        }
    }

    let failed = run
        .tracker
        .snapshot()
        .values()
        .any(|r| r.status.is_failure());

    if failed && run.strategy == ExecutionStrategy::CancelOnError {
        log::info!("Flow {flow_id} failed, compensating completed stages");
        // Forward workers may still be blocked after a timeout
        let compensation_pool = build_pool(jobs)?;
        compensation_pool.install(|| run.compensate(tree));
    }

    let mut report = FlowReport::build(
        flow_id,
        tree,
        run.strategy,
        timed_out,
        run.tracker.snapshot(),
    );
    if timed_out && !report.status.is_failure() {
        report.status = StageStatus::Failed;
    }

    run.listener.on_flow_complete(flow_id, report.status);
    Ok(report)
}

fn build_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("stageflow-worker-{i}"))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))
}

/// State shared by all workers of one execution
struct Run {
    flow_id: String,
    strategy: ExecutionStrategy,
    jobs: usize,
    tracker: StatusTracker,
    /// Raised on the first failure under cancel-on-error and on timeout
    aborted: AtomicBool,
    listener: Arc<dyn FlowListener>,
}

impl Run {
    fn run_node(&self, node: &FlowNode) -> StageStatus {
        match node {
            FlowNode::Noop { .. } => StageStatus::Succeeded,
            FlowNode::Stage(stage) => self.run_stage(stage),
            FlowNode::Sequential { children, .. } => {
                for child in children {
                    let status = self.run_node(child);
                    if status != StageStatus::Succeeded {
                        return status;
                    }
                }
                StageStatus::Succeeded
            }
            FlowNode::Parallel { children, .. } => {
                let statuses: Vec<StageStatus> = if self.jobs == 1 || children.len() == 1 {
                    children.iter().map(|child| self.run_node(child)).collect()
                } else {
                    children.par_iter().map(|child| self.run_node(child)).collect()
                };
                aggregate_status(statuses)
            }
        }
    }

    fn run_stage(&self, stage: &SharedStage) -> StageStatus {
        let stage_id = stage.id();
        if !self.tracker.start_unless(&stage_id, &self.aborted) {
            log::debug!("Stage {stage_id} not started, flow aborted");
            return StageStatus::Queued;
        }
        self.listener.on_stage_start(&stage_id, &stage.description());

        let mut ctx = StageContext::new(&self.flow_id, &stage_id);
        let result = panic::catch_unwind(AssertUnwindSafe(|| stage.execute(&mut ctx)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("stage panicked")));

        let (status, error) = match result {
            Ok(()) => (StageStatus::Succeeded, None),
            Err(e) => {
                if self.strategy == ExecutionStrategy::CancelOnError {
                    self.aborted.store(true, Ordering::SeqCst);
                }
                (StageStatus::Failed, Some(format!("{e:#}")))
            }
        };

        if !self
            .tracker
            .finish(&stage_id, status, error.clone(), Some(ctx.retry))
        {
            // Finalized by the timeout sweep while this stage was running
            log::warn!("Stage {stage_id} returned after the flow timed out");
            return self.tracker.status(&stage_id).unwrap_or(StageStatus::Failed);
        }

        self.listener
            .on_stage_complete(&stage_id, status, error.as_deref());
        status
    }

    /// Compensation pass in the same shape as the forward pass
    fn compensate(&self, node: &FlowNode) {
        match node {
            FlowNode::Noop { .. } => {}
            FlowNode::Stage(stage) => self.compensate_stage(stage),
            FlowNode::Sequential { children, .. } => {
                for child in children.iter().rev() {
                    self.compensate(child);
                }
            }
            FlowNode::Parallel { children, .. } => {
                if self.jobs == 1 || children.len() == 1 {
                    children.iter().for_each(|child| self.compensate(child));
                } else {
                    children.par_iter().for_each(|child| self.compensate(child));
                }
            }
        }
    }

    fn compensate_stage(&self, stage: &SharedStage) {
        let stage_id = stage.id();
        if !stage.cancel_if_failed()
            || self.tracker.status(&stage_id) != Some(StageStatus::Succeeded)
        {
            return;
        }

        let mut ctx = StageContext::new(&self.flow_id, &stage_id);
        let result = panic::catch_unwind(AssertUnwindSafe(|| stage.cancel(&mut ctx)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("compensation panicked")));

        let (status, error) = match result {
            Ok(()) => (StageStatus::Cancelled, None),
            Err(e) => {
                log::warn!("Compensation of {stage_id} failed: {e:#}");
                (StageStatus::CancellationFailed, Some(format!("{e:#}")))
            }
        };

        self.tracker
            .finish(&stage_id, status, error.clone(), Some(ctx.retry));
        self.listener
            .on_stage_complete(&stage_id, status, error.as_deref());
    }
}
