//! Cooperative task scheduler (spec §4.G).
//!
//! Deliberately trivial: a static list of zero-argument task functions run
//! once per round, no yielding, no preemption, no priority. SGPIO and the
//! clock graph never call into this and must not come to depend on it —
//! this exists purely as an interface external collaborators (the UART/DAC
//! drivers out of this crate's core scope) can register against.

/// A task is a plain function pointer; no captured state, matching spec.md
/// §9's guidance that ISRs (and, by the same argument, scheduler tasks)
/// must be free functions, never closures over stack data.
pub type Task = fn();

/// Runs a fixed list of tasks once per round.
///
/// `TASKS` is supplied by the caller at construction time (typically a
/// `&'static [Task]`) rather than grown at runtime, matching spec.md §1's
/// no-heap-allocation non-goal.
pub struct Scheduler {
    tasks: &'static [Task],
}

impl Scheduler {
    /// Build a scheduler over a fixed, caller-owned task list.
    pub const fn new(tasks: &'static [Task]) -> Self {
        Self { tasks }
    }

    /// Run every registered task exactly once.
    pub fn run_tasks(&self) {
        for task in self.tasks {
            task();
        }
    }

    /// Run every registered task, forever, one round after another. Never
    /// returns.
    pub fn run(&self) -> ! {
        loop {
            self.run_tasks();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn bump() {
        CALLS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn run_tasks_invokes_every_task_once() {
        CALLS.store(0, Ordering::Relaxed);
        static TASKS: [Task; 3] = [bump, bump, bump];
        let sched = Scheduler::new(&TASKS);
        sched.run_tasks();
        assert_eq!(CALLS.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn empty_task_list_is_a_no_op() {
        static TASKS: [Task; 0] = [];
        let sched = Scheduler::new(&TASKS);
        sched.run_tasks();
    }
}
