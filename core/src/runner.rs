use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::sync::Semaphore;

use crate::agents::state::GlobalState;
use crate::intercept::flow::TaskPacket;
use crate::report::ReportGenerator;
use crate::store::TaskQueue;
use crate::Orchestrator;

const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Pumps captured requests off the durable queue and runs one scan graph
/// per packet. Concurrency is bounded by a counting semaphore sized
/// `SCAN_MAX_TASKS`; a failing scan is logged and dropped without touching
/// its siblings.
pub struct TaskRunner {
    queue: Arc<dyn TaskQueue>,
    orchestrator: Arc<Orchestrator>,
    report: Arc<ReportGenerator>,
    scan_permits: Arc<Semaphore>,
    stop: AtomicBool,
}

impl TaskRunner {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        orchestrator: Arc<Orchestrator>,
        report: Arc<ReportGenerator>,
        max_tasks: usize,
    ) -> Self {
        info!("Task runner ready, max concurrent scans: {}", max_tasks);
        Self {
            queue,
            orchestrator,
            report,
            scan_permits: Arc::new(Semaphore::new(max_tasks.max(1))),
            stop: AtomicBool::new(false),
        }
    }

    /// Cooperative shutdown: stop pumping the queue; in-flight scans drain
    /// on their own.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub async fn run(self: &Arc<Self>) {
        info!("Task runner listening on the scan queue");
        while !self.stop.load(Ordering::SeqCst) {
            match self.queue.pop(QUEUE_POLL_TIMEOUT).await {
                Ok(Some(packet)) => {
                    let runner = Arc::clone(self);
                    tokio::spawn(async move {
                        runner.process_packet(packet).await;
                    });
                }
                Ok(None) => continue,
                Err(e) => {
                    error!("Queue poll failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!("Task runner stopped pumping; in-flight scans will drain");
    }

    async fn process_packet(&self, packet: TaskPacket) {
        let _permit = self
            .scan_permits
            .acquire()
            .await
            .expect("scan semaphore closed unexpectedly");

        let mut global = GlobalState::from_packet(&packet);
        info!(
            "Scan started: {} | {} {}",
            global.request_id, global.method, global.target_url
        );

        self.orchestrator.run_scan(&mut global).await;

        if global.findings.is_empty() {
            info!("No vulnerabilities found: {}", global.request_id);
        } else {
            match self.report.generate(&global.findings, &global.request_id) {
                Ok(path) => info!(
                    "Vulnerabilities found! Report written to {}",
                    path.display()
                ),
                Err(e) => error!("Failed to render report: {}", e),
            }
        }
        info!(
            "Scan complete: {} | tasks: {:?} | findings: {}",
            global.request_id,
            global.tasks,
            global.findings.len()
        );
    }
}
