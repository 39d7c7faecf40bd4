use std::{
    collections::HashMap,
    fmt::Write as _,
    io::Write as _,
    sync::{Mutex, PoisonError},
};

use affinitygate_model::Endpoint;

/// Counts requests per `key-endpoint` pair.
#[derive(Debug, Default)]
pub struct RequestStats {
    counts: Mutex<HashMap<String, u64>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, endpoint: &Endpoint) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(format!("{key}-{endpoint}")).or_default() += 1;
    }

    /// Counters sorted by `key-endpoint`.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<_> = counts.iter().map(|(pair, count)| (pair.clone(), *count)).collect();
        snapshot.sort();
        snapshot
    }

    /// One `key-endpoint: count` line per pair.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (pair, count) in self.snapshot() {
            let _ = writeln!(out, "{pair}: {count}");
        }
        out
    }

    /// Print the table to stdout.
    pub fn dump(&self) {
        let rendered = self.render();
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(rendered.as_bytes()).and_then(|()| stdout.flush()) {
            tracing::warn!("[AG.Proxy] fail to dump stats: {e}");
        }
    }
}
