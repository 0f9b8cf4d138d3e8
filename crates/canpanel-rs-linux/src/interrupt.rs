// crates/canpanel-rs-linux/src/interrupt.rs

use log::trace;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Handler = Box<dyn FnMut() + Send>;

/// The receive interrupt line of one CAN peripheral.
///
/// The peripheral side calls [`raise`](Self::raise) right after a frame lands
/// in a receive buffer, on whichever thread delivered it. A running panel
/// attaches a handler that empties the controller before `raise` returns, so
/// the next frame finds its buffer free.
#[derive(Clone, Default)]
pub struct InterruptLine {
    handler: Arc<Mutex<Option<Handler>>>,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the attached handler. Without one the interrupt is lost and the
    /// frame stays in its buffer.
    pub fn raise(&self) {
        match self.lock().as_mut() {
            Some(service) => service(),
            None => trace!("[IRQ] Raised with no panel attached."),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn attach(&self, handler: impl FnMut() + Send + 'static) {
        *self.lock() = Some(Box::new(handler));
    }

    pub(crate) fn detach(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Handler>> {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for InterruptLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptLine")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn raise_runs_the_attached_handler_until_detached() {
        let line = InterruptLine::new();
        let count = Arc::new(AtomicUsize::new(0));
        line.raise();

        let counter = count.clone();
        line.attach(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        line.clone().raise();
        line.raise();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        line.detach();
        line.raise();
        assert!(!line.is_attached());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
