//! Shared test utilities for medialib integration tests.
//!
//! `TestHarness` owns a temp directory holding one root per endpoint and an
//! on-disk database, so each test runs in isolation.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use medialib::endpoint::{Endpoint, EndpointKind, EndpointRegistry};
use medialib::handler::{ExportHandlers, ImportHandlers};
use medialib::{default_export_handlers, default_import_handlers, Database, WorkerContext};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub registry: EndpointRegistry,
}

impl TestHarness {
    /// Drop folder `drop` (scan + import), image library `images`, export
    /// target `out`.
    pub fn new() -> Self {
        Self::with_endpoints(|_| {})
    }

    /// Like [`new`](Self::new), letting the test adjust the endpoints first.
    pub fn with_endpoints(configure: impl FnOnce(&mut Vec<Endpoint>)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let mut drop = Endpoint::new("drop", EndpointKind::DropFolder, base.join("drop"));
        drop.capabilities.scan = true;
        drop.capabilities.import = true;
        let images = Endpoint::new("images", EndpointKind::Image, base.join("images"));
        let mut out = Endpoint::new("out", EndpointKind::Export, base.join("out"));
        out.capabilities.export = true;

        let mut endpoints = vec![drop, images, out];
        configure(&mut endpoints);
        for endpoint in &endpoints {
            std::fs::create_dir_all(&endpoint.root).expect("Failed to create endpoint root");
        }

        let db = Database::open(&base.join("medialib.db")).expect("Failed to open database");
        let registry = EndpointRegistry::new(endpoints).expect("Invalid endpoints");

        Self {
            temp_dir,
            db,
            registry,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn root(&self, endpoint_id: &str) -> PathBuf {
        self.registry
            .get(endpoint_id)
            .expect("Unknown endpoint")
            .root
            .clone()
    }

    /// Writes a file relative to an endpoint root, creating parents.
    pub fn write(&self, endpoint_id: &str, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.root(endpoint_id).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn context(&self) -> WorkerContext {
        self.context_with(default_import_handlers(), default_export_handlers())
    }

    pub fn context_with(
        &self,
        import_handlers: ImportHandlers,
        export_handlers: ExportHandlers,
    ) -> WorkerContext {
        WorkerContext::new(
            self.db.clone(),
            self.registry.clone(),
            import_handlers,
            export_handlers,
        )
    }
}
