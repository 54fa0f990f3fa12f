//! Timing harness.
//!
//! Runs a workload a fixed number of times with the console in quiet mode
//! and `tracing` events muted, and reports the elapsed time. Progress is
//! reported out of band after every completed tenth of the run, and time
//! spent reporting is not counted.

use crate::model::PokemonGraph;
use crate::report::print_pokemon_stats;
use crate::strategy::{LoadOptions, Strategy};
use pokegraph_console::Console;
use pokegraph_core::{Result, RowSource};
use serde::Serialize;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::subscriber::NoSubscriber;

/// Result of one timed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingReport {
    pub iterations: usize,
    pub total: Duration,
    pub per_iteration: Duration,
}

impl TimingReport {
    fn new(iterations: usize, total: Duration) -> Self {
        let per_iteration = match u32::try_from(iterations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => total / n,
            Err(_) => total.div_f64(iterations as f64),
        };
        Self {
            iterations,
            total,
            per_iteration,
        }
    }

    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }

    pub fn per_iteration_ms(&self) -> f64 {
        self.per_iteration.as_secs_f64() * 1000.0
    }

    /// `"{label}: executed {n} times in {ms}ms ({avg}ms each)"`
    pub fn summary(&self, label: &str) -> String {
        format!(
            "{}: executed {} times in {:.3}ms ({:.3}ms each)",
            label,
            self.iterations,
            self.total_ms(),
            self.per_iteration_ms()
        )
    }
}

/// A progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Iterations between progress reports: a tenth of the run, at least one.
pub fn progress_step(iterations: usize) -> usize {
    (iterations / 10).max(1)
}

pub struct TimingHarness<'a> {
    console: &'a Console,
    on_progress: Box<dyn FnMut(Progress) + 'a>,
}

impl<'a> TimingHarness<'a> {
    /// A harness that reports progress through [`Console::progress`].
    pub fn new(console: &'a Console) -> Self {
        Self {
            console,
            on_progress: Box::new(move |p: Progress| console.progress(p.completed, p.total)),
        }
    }

    /// Replace the progress callback.
    pub fn on_progress(mut self, callback: impl FnMut(Progress) + 'a) -> Self {
        self.on_progress = Box::new(callback);
        self
    }

    pub fn console(&self) -> &'a Console {
        self.console
    }

    /// Run `work` `iterations` times and time it.
    ///
    /// `work` receives the zero-based iteration index. The first error
    /// aborts the run. The console mode and the thread's default
    /// subscriber are restored either way.
    pub fn run<F>(&mut self, iterations: usize, mut work: F) -> Result<TimingReport>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let console = self.console;
        let step = progress_step(iterations);
        let mut total = Duration::ZERO;

        {
            let _quiet = console.quiet_scope();
            let _mute = tracing::subscriber::set_default(NoSubscriber::default());

            for index in 0..iterations {
                let started = Instant::now();
                work(index)?;
                total += started.elapsed();

                let completed = index + 1;
                if completed % step == 0 && completed != iterations {
                    (self.on_progress)(Progress {
                        completed,
                        total: iterations,
                    });
                }
            }
        }

        let report = TimingReport::new(iterations, total);
        tracing::debug!(
            target: "pokegraph::harness",
            iterations,
            total_us = u64::try_from(report.total.as_micros()).unwrap_or(u64::MAX),
            "timed run finished"
        );
        Ok(report)
    }

    /// Time `strategy`: load the graph and print every pokemon's stats,
    /// `iterations` times.
    pub fn run_strategy(
        &mut self,
        strategy: Strategy,
        source: &Rc<dyn RowSource>,
        options: LoadOptions,
        iterations: usize,
    ) -> Result<TimingReport> {
        let console = self.console;
        self.run(iterations, |_| {
            let graph = strategy.load(source, options)?;
            print_graph(console, &graph)
        })
    }
}

/// Print stats for every pokemon in `graph`.
pub fn print_graph(console: &Console, graph: &PokemonGraph) -> Result<()> {
    for pokemon in graph {
        print_pokemon_stats(console, pokemon)?;
    }
    Ok(())
}

/// [`TimingHarness::run_strategy`] with console progress and default options.
pub fn run_strategy(
    console: &Console,
    strategy: Strategy,
    source: &Rc<dyn RowSource>,
    iterations: usize,
) -> Result<TimingReport> {
    TimingHarness::new(console).run_strategy(strategy, source, LoadOptions::default(), iterations)
}
