//! Per-iteration observation and cooperative cancellation.

use maxent_types::state::IterationRecord;

/// Observer verdict, checked once per iteration boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Cancel,
}

/// Receives one record per completed iteration.
pub trait ReconstructionObserver {
    /// Called after the iteration counter has advanced. `record.iteration`
    /// is the zero-based index of the iteration just run, so on a run of
    /// `N` iterations the last record carries `N - 1` while
    /// `MaxEntOutput::iterations` is `N`.
    fn on_iteration(&mut self, record: &IterationRecord) -> Progress;
}

impl<F> ReconstructionObserver for F
where
    F: FnMut(&IterationRecord) -> Progress,
{
    fn on_iteration(&mut self, record: &IterationRecord) -> Progress {
        self(record)
    }
}

/// Ignores every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ReconstructionObserver for NullObserver {
    fn on_iteration(&mut self, _record: &IterationRecord) -> Progress {
        Progress::Continue
    }
}

/// Writes progress through the `log` facade every `every` iterations.
#[derive(Debug, Clone, Copy)]
pub struct LogObserver {
    every: usize,
}

impl LogObserver {
    pub fn new(every: usize) -> Self {
        LogObserver {
            every: every.max(1),
        }
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ReconstructionObserver for LogObserver {
    fn on_iteration(&mut self, record: &IterationRecord) -> Progress {
        if record.iteration % self.every == 0 {
            log::debug!(
                "maxent iter {:>4} test={:.3e} S={:.6e} chtarg={:.6e} chisq={:.6e} flux={:.6e}",
                record.iteration,
                record.test,
                record.entropy,
                record.chtarg,
                record.chisq,
                record.flux,
            );
        }
        Progress::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maxent_types::state::{Phase, QuadraticModel};

    fn record(iteration: usize) -> IterationRecord {
        IterationRecord {
            iteration,
            phase: Phase::for_iteration(iteration),
            test: 0.1,
            entropy: -0.5,
            chtarg: 10.0,
            chisq: 12.0,
            flux: 1.0,
            beta: [0.0; 3],
            model: QuadraticModel::default(),
            multiplier: 0.0,
        }
    }

    #[test]
    fn test_closure_observer_can_cancel() {
        let mut seen = Vec::new();
        let mut obs = |r: &IterationRecord| {
            seen.push(r.iteration);
            if r.iteration >= 2 {
                Progress::Cancel
            } else {
                Progress::Continue
            }
        };
        assert_eq!(obs.on_iteration(&record(0)), Progress::Continue);
        assert_eq!(obs.on_iteration(&record(1)), Progress::Continue);
        assert_eq!(obs.on_iteration(&record(2)), Progress::Cancel);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_builtin_observers_continue() {
        let mut null = NullObserver;
        let mut logger = LogObserver::new(0);
        for i in 0..5 {
            assert_eq!(null.on_iteration(&record(i)), Progress::Continue);
            assert_eq!(logger.on_iteration(&record(i)), Progress::Continue);
        }
    }
}
