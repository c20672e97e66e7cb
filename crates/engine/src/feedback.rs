//! Run progress, execution log and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Interrupt};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the run stops after its current step
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type ProgressFn = Box<dyn FnMut(usize, usize) + Send>;

/// Collects progress messages for the execution log and counts steps.
///
/// Every message is also emitted through `tracing`.
pub struct Feedback {
    started: Instant,
    lines: Vec<String>,
    total_steps: usize,
    current_step: usize,
    cancel: CancelToken,
    on_progress: Option<ProgressFn>,
}

impl Default for Feedback {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedback")
            .field("lines", &self.lines.len())
            .field("total_steps", &self.total_steps)
            .field("current_step", &self.current_step)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        elapsed.subsec_millis()
    )
}

impl Feedback {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            lines: Vec::new(),
            total_steps: 0,
            current_step: 0,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    /// Observe an external cancellation token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Call `f(current, total)` after every completed step
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize, usize) + Send + 'static,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn push_info(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.record(message);
    }

    pub fn push_warning(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.record(&format!("WARNING: {}", message));
    }

    fn record(&mut self, message: &str) {
        let stamp = format_elapsed(self.started.elapsed());
        self.lines.push(format!("[{}] {}", stamp, message));
    }

    /// The execution log collected so far, one message per line
    pub fn text_log(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn set_total_steps(&mut self, total: usize) {
        self.total_steps = total;
        self.current_step = 0;
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Run one collaborator call as a counted step.
    ///
    /// A failure is wrapped with the step name. After the call the step
    /// counter advances and the cancellation flag is checked.
    pub(crate) fn step<T>(
        &mut self,
        name: &str,
        op: impl FnOnce() -> mopst_core::Result<T>,
    ) -> Result<T, Interrupt> {
        tracing::debug!(step = self.current_step + 1, total = self.total_steps, "{}", name);

        let value = op().map_err(|source| Error::Collaborator {
            step: name.to_string(),
            source,
        })?;

        self.current_step += 1;
        let (current, total) = (self.current_step, self.total_steps);
        if let Some(f) = self.on_progress.as_mut() {
            f(current, total);
        }

        self.check_cancelled()?;
        Ok(value)
    }

    pub(crate) fn check_cancelled(&mut self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            self.push_warning("Cancellation requested, stopping");
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }
}
