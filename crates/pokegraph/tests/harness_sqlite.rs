use pokegraph::prelude::*;
use pokegraph::{Progress, run_strategy};
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn seeded_source() -> Rc<dyn RowSource> {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    create_schema(&conn).expect("create schema");
    seed(&conn, SeedOptions { rng_seed: Some(11) }).expect("seed dataset");
    Rc::new(conn)
}

#[test]
fn per_iteration_times_count_matches_total() {
    let source = seeded_source();
    let console = Console::with_mode(OutputMode::Plain);
    let report = TimingHarness::new(&console)
        .on_progress(|_| {})
        .run_strategy(Strategy::EagerFull, &source, LoadOptions::default(), 100)
        .expect("timed run");

    assert_eq!(report.iterations, 100);
    assert!(report.total > Duration::ZERO);
    let rebuilt = report.per_iteration * 100;
    assert!(rebuilt <= report.total);
    assert!(report.total - rebuilt < Duration::from_micros(1));
}

#[test]
fn stats_are_hidden_while_timing() {
    let source = seeded_source();
    let (console, out) = Console::capturing(OutputMode::Plain);

    let report = run_strategy(&console, Strategy::OnDemand, &source, 20).expect("timed run");
    assert_eq!(report.iterations, 20);
    assert!(out.stdout().is_empty());
    // Progress is out of band: 20 iterations report after every second one.
    assert_eq!(out.stderr().lines().count(), 9);
    assert!(out.stderr().starts_with("2/20\n"));
    assert_eq!(console.mode(), OutputMode::Plain);

    // Outside the harness the same workload prints.
    let graph = Strategy::OnDemand
        .load(&source, LoadOptions::default())
        .unwrap();
    pokegraph::print_graph(&console, &graph).unwrap();
    assert!(out.stdout().contains("Ash owns Pikachu a Electric type pokemon"));
    assert!(out.stdout().contains("  - Electric Shock (Electric)\n"));
}

#[test]
fn every_strategy_can_be_timed() {
    let source = seeded_source();
    let console = Console::with_mode(OutputMode::Plain);
    for strategy in Strategy::ALL {
        let seen = RefCell::new(Vec::new());
        let report = TimingHarness::new(&console)
            .on_progress(|p: Progress| seen.borrow_mut().push(p.completed))
            .run_strategy(strategy, &source, LoadOptions::default(), 10)
            .unwrap_or_else(|e| panic!("{strategy} failed: {e}"));
        assert_eq!(report.iterations, 10);
        assert_eq!(seen.into_inner(), (1..10).collect::<Vec<_>>());
        assert!(
            report
                .summary(strategy.name())
                .starts_with(&format!("{strategy}: executed 10 times in "))
        );
    }
}

#[test]
fn failing_run_restores_console_mode() {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    create_schema(&conn).expect("create schema");
    seed(&conn, SeedOptions { rng_seed: Some(3) }).expect("seed dataset");
    conn.execute("DROP TABLE moves", &[]).unwrap();
    let source: Rc<dyn RowSource> = Rc::new(conn);

    let (console, _out) = Console::capturing(OutputMode::Rich);
    let err = run_strategy(&console, Strategy::ManualBatched, &source, 5).unwrap_err();
    assert!(matches!(err, Error::Store(_)));
    assert_eq!(console.mode(), OutputMode::Rich);
}

#[test]
fn disabled_on_demand_fails_the_run() {
    let source = seeded_source();
    let console = Console::with_mode(OutputMode::Plain);
    let err = TimingHarness::new(&console)
        .on_progress(|_| {})
        .run_strategy(Strategy::OnDemand, &source, LoadOptions::eager_only(), 5)
        .unwrap_err();
    assert!(matches!(err, Error::NotLoaded(_)));
}

/// Counts library events, leaving out the harness's own summary event.
struct LibraryEvents(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for LibraryEvents {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != "pokegraph::harness" {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn strategy_logging_is_silent_while_timing() {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    create_schema(&conn).expect("create schema");
    seed(&conn, SeedOptions { rng_seed: Some(11) }).expect("seed dataset");
    let source: Rc<dyn RowSource> = Rc::new(TrackedSource::new(conn));

    let events = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(LibraryEvents(Arc::clone(&events)));
    let (console, _out) = Console::capturing(OutputMode::Plain);

    tracing::subscriber::with_default(subscriber, || {
        TimingHarness::new(&console)
            .on_progress(|_| {})
            .run_strategy(Strategy::OnDemand, &source, LoadOptions::default(), 10)
            .expect("timed run");
        assert_eq!(events.load(Ordering::SeqCst), 0);

        // The same load outside the harness does log.
        let graph = Strategy::OnDemand
            .load(&source, LoadOptions::default())
            .unwrap();
        pokegraph::print_graph(&console, &graph).unwrap();
    });
    assert!(events.load(Ordering::SeqCst) > 0);
}
