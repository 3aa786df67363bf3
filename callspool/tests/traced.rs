#![expect(missing_docs, reason = "tests")]

use std::num::ParseIntError;
use std::panic;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use callspool::sink::{MemoryHandle, MemorySink};
use callspool::{Engine, Record, Status, Tracer, call_site, traced};
use pretty_assertions::assert_eq;

struct Fixture {
    engine: Engine,
    tracer: Tracer,
    received: MemoryHandle,
}

static FIXTURE: LazyLock<Fixture> = LazyLock::new(|| {
    let (sink, received) = MemorySink::new();
    let engine = Engine::builder()
        .flush_interval(Duration::from_secs(3600))
        .summary_limit(32)
        .sink(sink)
        .build()
        .unwrap();
    let tracer = engine.tracer("traced-tests");
    Fixture {
        engine,
        tracer,
        received,
    }
});

static TRACER: LazyLock<Tracer> = LazyLock::new(|| FIXTURE.tracer.clone());

/// Every test shares one engine, so they take turns and start from an empty sink.
fn exclusive() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    FIXTURE.engine.flush();
    FIXTURE.received.take();
    guard
}

fn collected() -> Vec<Record> {
    FIXTURE.engine.flush();
    FIXTURE.received.take().into_iter().flatten().collect()
}

#[traced(tracer = TRACER)]
fn add(a: u32, b: u32) -> u32 {
    a + b
}

#[traced(tracer = TRACER, summary = true)]
fn parse(input: &str) -> Result<u16, ParseIntError> {
    let value = input.trim().parse::<u16>()?;
    Ok(value)
}

#[traced(tracer = TRACER, name = "early_exit")]
fn first_even(values: &[i32]) -> Option<i32> {
    for &value in values {
        if value % 2 == 0 {
            return Some(value);
        }
    }
    None
}

#[traced(tracer = TRACER)]
fn evens(limit: u8) -> impl Iterator<Item = u8> {
    (0..limit).filter(|value| value % 2 == 0)
}

#[traced(tracer = TRACER)]
fn explode() {
    panic!("exploded on purpose");
}

struct Counter {
    count: u32,
}

impl Counter {
    #[traced(tracer = TRACER)]
    fn bump(&mut self) -> u32 {
        self.count += 1;
        self.count
    }
}

#[test]
fn attribute_records_plain_functions() {
    let _guard = exclusive();

    assert_eq!(add(2, 3), 5);

    let records = collected();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor_id(), "traced-tests");
    assert_eq!(records[0].unit_name(), "add");
    assert_eq!(records[0].scope_name(), module_path!());
    assert_eq!(records[0].status(), Status::Success);
}

#[test]
fn attribute_classifies_results() {
    let _guard = exclusive();

    assert_eq!(parse(" 8080 "), Ok(8080));
    let error = parse("http").unwrap_err();
    assert_eq!(error.to_string(), "invalid digit found in string");

    let records = collected();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status(), Status::Success);
    assert_eq!(records[0].result_summary(), Some("8080"));
    assert_eq!(records[1].status(), Status::Error);
    assert_eq!(records[1].error_detail(), "invalid digit found in string");
    assert_eq!(records[1].result_summary(), None);
}

#[test]
fn attribute_respects_name_and_early_return() {
    let _guard = exclusive();

    assert_eq!(first_even(&[1, 3, 4, 5]), Some(4));
    assert_eq!(first_even(&[1, 3]), None);

    let records = collected();
    let units: Vec<_> = records.iter().map(Record::unit_name).collect();
    assert_eq!(units, ["early_exit", "early_exit"]);
}

#[test]
fn attribute_supports_opaque_returns_and_methods() {
    let _guard = exclusive();

    assert_eq!(evens(7).collect::<Vec<_>>(), [0, 2, 4, 6]);
    let mut counter = Counter { count: 0 };
    counter.bump();
    assert_eq!(counter.bump(), 2);

    let units: Vec<_> = collected()
        .iter()
        .map(|record| record.unit_name().to_owned())
        .collect();
    assert_eq!(units, ["evens", "bump", "bump"]);
}

#[test]
fn attribute_records_and_resumes_panics() {
    let _guard = exclusive();

    let payload = panic::catch_unwind(explode).unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"exploded on purpose"));

    let records = collected();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), Status::Error);
    assert_eq!(records[0].error_detail(), "exploded on purpose");
}

#[test]
fn call_site_names_the_enclosing_function() {
    let _guard = exclusive();

    let value = TRACER.call(call_site!(), || "inline");
    let from_closure = (|| call_site!())();

    assert_eq!(value, "inline");
    assert_eq!(from_closure.unit(), "call_site_names_the_enclosing_function");
    let records = collected();
    assert_eq!(
        records[0].unit_name(),
        "call_site_names_the_enclosing_function"
    );
    assert_eq!(records[0].scope_name(), module_path!());
}
