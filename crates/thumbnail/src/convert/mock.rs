//! In-process converter for testing.

use crate::convert::{Converter, geometry};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Converter that records how it was driven instead of running a process.
///
/// Every call bumps an invocation counter and tracks how many calls are in
/// progress at once (and the peak of that). A successful call writes the
/// geometry string (`"200x200"`) to the destination. Calls can be made to
/// fail, or held until the test [releases](Self::release) them.
///
/// # Examples
///
/// ```
/// use shelf_thumbnail::convert::MockConverter;
///
/// let converter = MockConverter::held();
/// converter.release(1);
/// assert_eq!(converter.invocations(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockConverter {
    invocations: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl MockConverter {
    /// Converts immediately and successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every conversion with a non-zero exit status.
    pub fn failing() -> Self {
        let converter = Self::default();
        converter.set_failing(true);
        converter
    }

    /// Waits inside every conversion until a matching [`release`](Self::release).
    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let `count` held conversions finish (now or whenever they arrive).
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Total number of conversions started.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Conversions started but not yet finished.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of conversions that were ever running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(&self, _source: &Path, destination: &Path, dimension: u32) -> Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }

        let result = if self.failing.load(Ordering::SeqCst) {
            Err(exn::Exn::from(ErrorKind::ExitStatus {
                program: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            }))
        } else {
            tokio::fs::write(destination, geometry(dimension))
                .await
                .or_raise(|| ErrorKind::TempFile(destination.to_path_buf()))
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
