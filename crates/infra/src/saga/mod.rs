//! Orchestrated sagas: multi-aggregate operations with compensating actions.
//!
//! Each forward step that succeeded records how to undo itself. If a later
//! step fails, the recorded compensations run newest-first; on success the
//! log is committed and nothing runs.

pub mod order_placement;

pub use order_placement::{PlaceOrderRequest, PlacementContext, place_order};

type Compensation<'a> = Box<dyn FnOnce() -> Result<(), String> + 'a>;

pub struct CompensationLog<'a> {
    saga: &'static str,
    steps: Vec<(&'static str, Compensation<'a>)>,
}

impl<'a> CompensationLog<'a> {
    pub fn new(saga: &'static str) -> Self {
        Self {
            saga,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: &'static str, undo: impl FnOnce() -> Result<(), String> + 'a) {
        self.steps.push((step, Box::new(undo)));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The saga completed; drop every compensation unrun.
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Undo every recorded step, newest first. Returns how many compensations
    /// failed; each failure is logged, and later ones still run.
    pub fn compensate(mut self) -> usize {
        let mut failed = 0;
        while let Some((step, undo)) = self.steps.pop() {
            match undo() {
                Ok(()) => tracing::info!(saga = self.saga, step, "compensated"),
                Err(e) => {
                    failed += 1;
                    tracing::error!(saga = self.saga, step, error = %e, "compensation failed");
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn compensations_run_newest_first() {
        let ran = RefCell::new(Vec::new());
        let mut log = CompensationLog::new("test");
        log.record("first", || {
            ran.borrow_mut().push("first");
            Ok(())
        });
        log.record("second", || {
            ran.borrow_mut().push("second");
            Ok(())
        });

        assert_eq!(log.compensate(), 0);
        assert_eq!(*ran.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn a_failing_compensation_does_not_stop_the_rest() {
        let ran = RefCell::new(Vec::new());
        let mut log = CompensationLog::new("test");
        log.record("first", || {
            ran.borrow_mut().push("first");
            Ok(())
        });
        log.record("second", || Err("store down".to_string()));

        assert_eq!(log.compensate(), 1);
        assert_eq!(*ran.borrow(), vec!["first"]);
    }

    #[test]
    fn committed_log_runs_nothing() {
        let ran = RefCell::new(false);
        let mut log = CompensationLog::new("test");
        log.record("only", || {
            *ran.borrow_mut() = true;
            Ok(())
        });
        assert_eq!(log.len(), 1);
        log.commit();
        assert!(!*ran.borrow());
    }
}
