#![expect(missing_docs, reason = "tests")]

use callspool::sink::CsvSink;
use callspool::{Engine, EngineBuilder, EngineConfig, Status, call_site};
use indoc::indoc;
use pretty_assertions::assert_eq;

#[test]
fn engine_appends_rows_across_restarts() {
    let folder = tempfile::tempdir().unwrap();
    let path = folder.path().join("calls.csv");

    for run in ["first", "second"] {
        let engine = Engine::builder()
            .sink(CsvSink::new(&path).unwrap())
            .build()
            .unwrap();
        let tracer = engine.tracer(run);
        tracer.call(call_site!("greet"), || "hello, world");
        let _ = tracer.try_call(call_site!("fail"), || Err::<(), _>("bad \"input\""));
        // Dropping flushes.
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<Vec<&str>> = content
        .split_terminator("\r\n")
        .map(|row| row.split(',').collect())
        .collect();

    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows[0],
        [
            "actor_id",
            "unit_name",
            "scope_name",
            "timestamp",
            "elapsed",
            "status",
            "error_detail",
            "result_summary",
        ]
    );
    let actors: Vec<_> = rows[1..].iter().map(|row| row[0]).collect();
    assert_eq!(actors, ["first", "first", "second", "second"]);
    assert_eq!(rows[1][5], Status::Success.as_str());
    assert_eq!(rows[2][5], Status::Error.as_str());
    assert_eq!(rows[2][6], "\"bad \"\"input\"\"\"");
}

#[test]
fn engine_from_config_file() {
    let folder = tempfile::tempdir().unwrap();
    let config_path = folder.path().join("callspool.toml");
    std::fs::write(
        &config_path,
        indoc! {r#"
            max_queue_size = 2
            flush_interval = 30.0
            flush_on_exit = true
            log_level = "warn"
            summary_limit = 0
        "#},
    )
    .unwrap();
    let csv_path = folder.path().join("calls.csv");

    let config = EngineConfig::load(&config_path).unwrap();
    let engine = EngineBuilder::from_config(config)
        .sink(CsvSink::new(&csv_path).unwrap().with_delimiter(';'))
        .build()
        .unwrap();
    let tracer = engine.tracer("config");
    for _ in 0..3 {
        tracer.call_summarized(call_site!("work"), || 42);
    }

    let metadata = engine.metadata();
    assert_eq!(metadata.max_queue_size, 2);
    assert_eq!(metadata.batches_flushed, 1);
    drop(engine);

    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("actor_id;unit_name;scope_name;"));
    assert!(lines[1].starts_with("config;work;csv_export;"));
    assert!(lines[1].ends_with(";success;;"));
}
