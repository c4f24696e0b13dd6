//! Append-only JSON-lines audit file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use airspace_core::{AuditEvent, AuditSink};
use anyhow::{Context, Result};

/// Writes one serialized [`AuditEvent`] per line and flushes after each.
pub struct JsonLinesAuditSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("Audit event serialization failed: {}", err);
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            tracing::warn!("Audit log writer poisoned; dropping {:?}", event.kind);
            return;
        };
        if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::warn!("Audit log write failed: {}", err);
        }
    }
}
