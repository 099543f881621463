//! Scoped suppression of known-noisy log lines.
//!
//! [`FilteringLogger`] wraps the process logger and drops any record whose
//! message contains a currently active pattern. Patterns are activated with
//! [`suppress`] and stay active only while the returned guard lives.

use std::sync::RwLock;

static SUPPRESSED: RwLock<Vec<String>> = RwLock::new(Vec::new());

/// Logger decorator consulted by every `log` macro once installed.
pub struct FilteringLogger {
    inner: Box<dyn log::Log>,
}

impl FilteringLogger {
    pub fn new(inner: Box<dyn log::Log>) -> Self {
        Self { inner }
    }

    /// Installs `inner` (wrapped) as the global logger.
    pub fn install(
        inner: Box<dyn log::Log>,
        max_level: log::LevelFilter,
    ) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(Self::new(inner)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for FilteringLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        if is_suppressed(&record.args().to_string()) {
            return;
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Keeps one pattern suppressed until dropped.
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressionGuard {
    patterns: Vec<String>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        let Ok(mut active) = SUPPRESSED.write() else {
            return;
        };
        for pattern in &self.patterns {
            // Remove one occurrence so nested guards on the same text compose.
            if let Some(pos) = active.iter().position(|p| p == pattern) {
                active.remove(pos);
            }
        }
    }
}

/// Suppresses records containing any of `patterns` while the guard lives.
pub fn suppress<I, S>(patterns: I) -> SuppressionGuard
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
    if let Ok(mut active) = SUPPRESSED.write() {
        active.extend(patterns.iter().cloned());
    }
    SuppressionGuard { patterns }
}

pub fn is_suppressed(message: &str) -> bool {
    match SUPPRESSED.read() {
        Ok(active) => active.iter().any(|p| message.contains(p.as_str())),
        Err(_) => false,
    }
}
