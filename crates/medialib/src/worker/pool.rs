use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::worker::{
    run_loop, wake_pair, ExportCoordinator, ImportCoordinator, Janitor, RetentionSweeper,
    Scanner, WakeHandle, WakeSignal, WorkerContext,
};

/// Owns every worker thread and the handles used to wake them.
///
/// One scanner per scannable endpoint, one importer per importable
/// endpoint, one exporter per exportable endpoint, plus a single retention
/// sweeper and a single janitor.
pub struct WorkerPool {
    scanners: HashMap<String, WakeHandle>,
    importers: HashMap<String, WakeHandle>,
    exporters: HashMap<String, WakeHandle>,
    retention: WakeHandle,
    janitor: WakeHandle,
    threads: Vec<(String, JoinHandle<()>)>,
    shutdown: Arc<AtomicBool>,
}

fn spawn(
    threads: &mut Vec<(String, JoinHandle<()>)>,
    name: String,
    f: impl FnOnce() + Send + 'static,
) -> Result<(), WorkerError> {
    let handle = thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| WorkerError::SpawnFailed(format!("{}: {}", name, e)))?;
    threads.push((name, handle));
    Ok(())
}

impl WorkerPool {
    pub fn start(ctx: WorkerContext) -> Result<Self, WorkerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::new();
        let mut importers = HashMap::new();
        let mut exporters = HashMap::new();
        let mut scanners = HashMap::new();

        let worker_interval = ctx.intervals.worker();

        for endpoint in ctx.registry.importable() {
            let coordinator = ImportCoordinator::new(&endpoint.id, &ctx)?;
            let (handle, signal) = wake_pair();
            let flag = Arc::clone(&shutdown);
            let name = format!("importer-{}", endpoint.id);
            let loop_name = name.clone();
            spawn(&mut threads, name, move || {
                run_loop(&loop_name, signal, worker_interval, flag, || {
                    coordinator.drain();
                })
            })?;
            importers.insert(endpoint.id.clone(), handle);
        }

        for endpoint in ctx.registry.exportable() {
            let coordinator = ExportCoordinator::new(&endpoint.id, &ctx)?;
            let (handle, signal) = wake_pair();
            let flag = Arc::clone(&shutdown);
            let name = format!("exporter-{}", endpoint.id);
            let loop_name = name.clone();
            spawn(&mut threads, name, move || {
                run_loop(&loop_name, signal, worker_interval, flag, || {
                    coordinator.drain();
                })
            })?;
            exporters.insert(endpoint.id.clone(), handle);
        }

        let scanner_interval = ctx.intervals.scanner();
        for endpoint in ctx.registry.scannable() {
            let scanner = Scanner::new(endpoint.clone(), ctx.imports.clone());
            let importer = importers.get(&endpoint.id).cloned();
            let (handle, signal) = wake_pair();
            let flag = Arc::clone(&shutdown);
            let name = format!("scanner-{}", endpoint.id);
            let loop_name = name.clone();
            spawn(&mut threads, name, move || {
                run_loop(&loop_name, signal, scanner_interval, flag, || {
                    scan_round(&scanner, importer.as_ref())
                })
            })?;
            scanners.insert(endpoint.id.clone(), handle);
        }

        let retention = {
            let sweeper = RetentionSweeper::new(
                Arc::clone(&ctx.records),
                ctx.transfer.clone(),
                ctx.retention.postpone(),
            );
            let (handle, signal) = wake_pair();
            let interval = ctx.intervals.retention();
            spawn_sweep(&mut threads, "retention", signal, interval, &shutdown, move || {
                if let Err(e) = sweeper.sweep(Utc::now()) {
                    error!("Retention sweep failed: {}", e);
                }
            })?;
            handle
        };

        let janitor = {
            let janitor = Janitor::new(
                ctx.imports.clone(),
                ctx.exports.clone(),
                ctx.retention.janitor_window(),
            );
            let (handle, signal) = wake_pair();
            let interval = ctx.intervals.janitor();
            spawn_sweep(&mut threads, "janitor", signal, interval, &shutdown, move || {
                if let Err(e) = janitor.sweep(Utc::now()) {
                    error!("Janitor sweep failed: {}", e);
                }
            })?;
            handle
        };

        info!(
            "Started {} worker thread(s): {} importer(s), {} exporter(s), {} scanner(s)",
            threads.len(),
            importers.len(),
            exporters.len(),
            scanners.len()
        );

        Ok(Self {
            scanners,
            importers,
            exporters,
            retention,
            janitor,
            threads,
            shutdown,
        })
    }

    fn trigger(
        handles: &HashMap<String, WakeHandle>,
        role: &'static str,
        endpoint_id: &str,
    ) -> Result<(), WorkerError> {
        let handle = handles
            .get(endpoint_id)
            .ok_or_else(|| WorkerError::UnknownEndpoint {
                role,
                endpoint: endpoint_id.to_string(),
            })?;
        debug!("Triggering {} for '{}'", role, endpoint_id);
        handle.trigger();
        Ok(())
    }

    pub fn trigger_scan(&self, endpoint_id: &str) -> Result<(), WorkerError> {
        Self::trigger(&self.scanners, "scan", endpoint_id)
    }

    pub fn trigger_import(&self, endpoint_id: &str) -> Result<(), WorkerError> {
        Self::trigger(&self.importers, "import", endpoint_id)
    }

    pub fn trigger_export(&self, endpoint_id: &str) -> Result<(), WorkerError> {
        Self::trigger(&self.exporters, "export", endpoint_id)
    }

    pub fn trigger_retention(&self) {
        info!("Triggering retention sweep");
        self.retention.trigger();
    }

    pub fn trigger_janitor(&self) {
        self.janitor.trigger();
    }

    /// Asks every loop to stop at its next wait point. Jobs in flight run
    /// to completion.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);

        for handle in self
            .scanners
            .values()
            .chain(self.importers.values())
            .chain(self.exporters.values())
        {
            handle.trigger();
        }
        self.retention.trigger();
        self.janitor.trigger();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Joins all worker threads. Call after [`shutdown`](Self::shutdown).
    pub fn wait(self) {
        for (name, thread) in self.threads {
            if let Err(e) = thread.join() {
                error!("Worker {} panicked: {:?}", name, e);
            } else {
                debug!("Worker {} finished", name);
            }
        }

        info!("All workers have stopped");
    }
}

fn spawn_sweep(
    threads: &mut Vec<(String, JoinHandle<()>)>,
    name: &str,
    signal: WakeSignal,
    interval: std::time::Duration,
    shutdown: &Arc<AtomicBool>,
    mut round: impl FnMut() + Send + 'static,
) -> Result<(), WorkerError> {
    let flag = Arc::clone(shutdown);
    let loop_name = name.to_string();
    spawn(threads, name.to_string(), move || {
        run_loop(&loop_name, signal, interval, flag, &mut round)
    })
}

fn scan_round(scanner: &Scanner, importer: Option<&WakeHandle>) {
    match scanner.scan() {
        Ok(report) if report.created > 0 => {
            if let Some(importer) = importer {
                importer.trigger();
            }
        }
        Ok(_) => {}
        Err(e) => error!("Scan of '{}' failed: {}", scanner.endpoint().id, e),
    }
}
