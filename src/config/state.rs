// Application state module
// Shared, read-only runtime state handed to every connection

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::types::Config;
use crate::assembler::Assembler;

/// Application state
pub struct AppState {
    pub config: Config,
    pub assembler: Assembler,

    /// Connections currently being served
    pub active_connections: Arc<AtomicUsize>,
    /// Fired once when the process is asked to stop
    pub shutdown: Arc<Notify>,
    pub shutdown_requested: AtomicBool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            assembler: Assembler::new(config.assembler.clone()),
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(Notify::new()),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Mark shutdown and wake the accept loop
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}
