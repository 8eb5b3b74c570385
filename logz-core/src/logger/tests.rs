use super::*;
use crate::logger::writer::tests::SharedBuffer;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::thread;
use tempfile::tempdir;

#[derive(Clone, Default)]
struct RecordingNotifier(Arc<Mutex<Vec<Entry>>>);

impl RecordingNotifier {
    fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, entry: &Entry) {
        self.0.lock().unwrap().push(entry.clone());
    }
}

#[derive(Clone, Default)]
struct RecordingExit(Arc<Mutex<Vec<i32>>>);

impl ExitHandler for RecordingExit {
    fn exit(&self, code: i32) {
        self.0.lock().unwrap().push(code);
    }
}

struct Harness {
    logger: Logger,
    buffer: SharedBuffer,
    notifier: RecordingNotifier,
    metrics: Arc<CounterRegistry>,
    exit: RecordingExit,
}

fn harness(level: LogLevel) -> Harness {
    let buffer = SharedBuffer::default();
    let notifier = RecordingNotifier::default();
    let metrics = Arc::new(CounterRegistry::new());
    let exit = RecordingExit::default();
    let logger = Logger::builder()
        .level(level)
        .writer(DefaultWriter::new(
            Box::new(buffer.clone()),
            Box::new(JsonFormatter),
        ))
        .notifier(notifier.clone())
        .metrics(metrics.clone())
        .exit_handler(exit.clone())
        .build();
    Harness {
        logger,
        buffer,
        notifier,
        metrics,
        exit,
    }
}

fn written(buffer: &SharedBuffer) -> Vec<Entry> {
    buffer
        .contents()
        .lines()
        .map(|line| serde_json::from_str(line).expect("json entry"))
        .collect()
}

#[test]
fn filtered_level_has_no_side_effects() {
    let h = harness(LogLevel::Warn);

    h.logger.info("ignored", Metadata::new());
    h.logger.notice("ignored", Metadata::new());
    h.logger.debug("ignored", Metadata::new());

    assert!(h.buffer.contents().is_empty());
    assert!(h.notifier.entries().is_empty());
    assert!(h.metrics.snapshot().is_empty());
    assert!(h.exit.0.lock().unwrap().is_empty());
}

#[test]
fn info_merges_global_and_call_metadata() {
    let h = harness(LogLevel::Info);
    h.logger.set_metadata("env", "prod");

    h.logger.info("started", crate::metadata!("k" => "v"));

    let entries = written(&h.buffer);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.level(), LogLevel::Info);
    assert_eq!(entry.severity(), 2);
    assert_eq!(entry.message(), "started");
    assert_eq!(entry.metadata().get("env"), Some(&json!("prod")));
    assert_eq!(entry.metadata().get("k"), Some(&json!("v")));
    assert_eq!(h.notifier.entries(), entries);
}

#[test]
fn call_metadata_overrides_global_keys() {
    let h = harness(LogLevel::Trace);
    h.logger.set_metadata("user", "global");

    h.logger.trace("t", crate::metadata!("user" => "local"));

    let entries = written(&h.buffer);
    assert_eq!(entries[0].metadata().get("user"), Some(&json!("local")));
    assert_eq!(h.logger.metadata().get("user"), Some(&json!("global")));
}

#[test]
fn fatal_writes_notifies_counts_then_exits() {
    let h = harness(LogLevel::Info);

    h.logger.fatal("boom", Metadata::new());

    assert_eq!(written(&h.buffer).len(), 1);
    assert_eq!(h.notifier.entries().len(), 1);
    assert_eq!(h.metrics.get(LOGS_TOTAL), 1);
    assert_eq!(h.metrics.get("logs_total_fatal"), 1);
    assert_eq!(*h.exit.0.lock().unwrap(), vec![1]);
}

#[test]
fn counters_track_each_level() {
    let h = harness(LogLevel::Trace);

    h.logger.success("a", Metadata::new());
    h.logger.warn("b", Metadata::new());
    h.logger.warn("c", Metadata::new());
    h.logger.error("d", Metadata::new());

    assert_eq!(h.metrics.get(LOGS_TOTAL), 4);
    assert_eq!(h.metrics.get("logs_total_success"), 1);
    assert_eq!(h.metrics.get("logs_total_warn"), 2);
    assert_eq!(h.metrics.get("logs_total_error"), 1);
    assert!(h.exit.0.lock().unwrap().is_empty());
}

#[test]
fn caller_points_at_the_call_site() {
    let h = harness(LogLevel::Info);

    h.logger.info("here", Metadata::new());
    let line = line!() - 1;

    let entries = written(&h.buffer);
    assert_eq!(entries[0].caller(), format!("logger/tests.rs:{line}"));
}

#[test]
fn macros_emit_with_fields_and_call_site() {
    let h = harness(LogLevel::Debug);

    crate::log_debug!(h.logger, "cache miss", "key" => "user:1", "attempt" => 2);
    let line = line!() - 1;
    crate::log_warn!(h.logger, "no fields");

    let entries = written(&h.buffer);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level(), LogLevel::Debug);
    assert_eq!(entries[0].metadata().get("attempt"), Some(&json!(2)));
    assert_eq!(entries[0].caller(), format!("logger/tests.rs:{line}"));
    assert!(entries[1].metadata().is_empty());
}

#[test]
fn set_level_takes_effect_immediately() {
    let h = harness(LogLevel::Error);
    h.logger.info("dropped", Metadata::new());

    h.logger.set_level(LogLevel::Info);
    assert_eq!(h.logger.level(), LogLevel::Info);
    h.logger.info("kept", Metadata::new());

    let entries = written(&h.buffer);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message(), "kept");
}

#[test]
fn context_is_attached_until_cleared() {
    let h = harness(LogLevel::Info);

    h.logger.set_context(Some("req-42".to_string()));
    h.logger.info("with", Metadata::new());
    h.logger.set_context(None);
    h.logger.info("without", Metadata::new());

    let entries = written(&h.buffer);
    assert_eq!(entries[0].context(), Some("req-42"));
    assert_eq!(entries[1].context(), None);
    assert!(!h.buffer.contents().lines().nth(1).unwrap().contains("context"));
}

#[test]
fn builder_defaults_are_usable() {
    let buffer = SharedBuffer::default();
    let logger = Logger::builder()
        .writer(DefaultWriter::new(
            Box::new(buffer.clone()),
            Box::new(TextFormatter::plain()),
        ))
        .build();

    logger.info("plain", Metadata::new());
    assert!(buffer.contents().contains("INFO - plain"));
}

#[test]
fn concurrent_emits_produce_whole_lines() {
    let h = harness(LogLevel::Info);
    let logger = Arc::new(h.logger);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..50 {
                    logger.info(format!("w{worker}-{i}"), crate::metadata!("worker" => worker));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(written(&h.buffer).len(), 400);
    assert_eq!(h.metrics.get(LOGS_TOTAL), 400);
}

#[test]
fn rotation_under_a_live_logger() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.log");
    fs::write(&path, vec![b'x'; 99]).unwrap();

    let logger = Logger::builder()
        .writer(DefaultWriter::open(
            &LogOutput::File(path.clone()),
            LogFormat::Json,
        ))
        .max_size_bytes(100)
        .build();

    assert_eq!(
        logger.check_and_rotate().expect("check"),
        Rotation::Skipped { size: 99 }
    );

    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(b"x")
        .unwrap();

    let outcome = logger.check_and_rotate().expect("rotate");
    let Rotation::Rotated { retired, size } = outcome else {
        panic!("expected rotation");
    };
    assert_eq!(size, 100);
    assert_eq!(fs::metadata(&retired).unwrap().len(), 100);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);

    logger.info("after rotation", Metadata::new());
    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains("after rotation"));
    assert_eq!(rotation::retired_files(&path).unwrap(), vec![retired]);
}

#[test]
fn rotation_is_skipped_for_stream_writers() {
    let h = harness(LogLevel::Info);
    assert_eq!(
        h.logger.check_and_rotate().expect("check"),
        Rotation::Skipped { size: 0 }
    );
}

#[test]
fn from_config_writes_to_configured_file() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("logs/app.log");
    let config = LogConfig {
        level: LogLevel::Debug,
        format: LogFormat::Json,
        output: LogOutput::File(path.clone()),
        ..LogConfig::default()
    };

    let logger = Logger::from_config(&config, Arc::new(NoopMetrics));
    logger.debug("configured", Metadata::new());

    let contents = fs::read_to_string(&path).unwrap();
    let entry: Entry = serde_json::from_str(contents.trim_end()).unwrap();
    assert_eq!(entry.level(), LogLevel::Debug);
    assert_eq!(entry.severity(), 1);
}

#[test]
fn writer_can_be_swapped_at_runtime() {
    let h = harness(LogLevel::Info);
    h.logger.info("first", Metadata::new());

    let replacement = SharedBuffer::default();
    let previous = h.logger.set_writer(DefaultWriter::new(
        Box::new(replacement.clone()),
        Box::new(JsonFormatter),
    ));
    assert!(previous.path().is_none());
    h.logger.info("second", Metadata::new());

    let before: Vec<String> = written(&h.buffer).iter().map(|e| e.message().to_string()).collect();
    let after: Vec<String> = written(&replacement).iter().map(|e| e.message().to_string()).collect();
    assert_eq!(before, vec!["first"]);
    assert_eq!(after, vec!["second"]);
}

#[test]
fn no_line_is_lost_while_rotating_under_load() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("app.log");
    let logger = Arc::new(
        Logger::builder()
            .writer(DefaultWriter::open(&LogOutput::File(path.clone()), LogFormat::Json))
            .max_size_bytes(4 * 1024)
            .build(),
    );

    let done = Arc::new(AtomicBool::new(false));
    let rotator = {
        let logger = Arc::clone(&logger);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rotations = 0usize;
            while !done.load(Ordering::Acquire) {
                // Two rotations in the same millisecond collide; the next pass retries.
                if let Ok(Rotation::Rotated { .. }) = logger.check_and_rotate() {
                    rotations += 1;
                }
                thread::sleep(Duration::from_millis(1));
            }
            rotations
        })
    };

    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..250 {
                    logger.info(format!("w{worker}-{i}"), Metadata::new());
                }
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let rotations = rotator.join().unwrap();

    let mut files = rotation::retired_files(&path).unwrap();
    files.push(path.clone());
    let mut messages = Vec::new();
    for file in &files {
        for line in fs::read_to_string(file).unwrap().lines() {
            let entry: Entry = serde_json::from_str(line).expect("whole json line");
            messages.push(entry.message().to_string());
        }
    }

    assert!(rotations >= 1, "expected at least one rotation");
    assert_eq!(files.len() - 1, rotations);
    assert_eq!(messages.len(), 1000);
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), 1000);
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..head_end]
        .lines()
        .find_map(|l| {
            l.to_ascii_lowercase()
                .strip_prefix("content-length:")
                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
        })
        .unwrap_or(0);
    request.len() >= head_end + 4 + length
}

fn accept_one_post(listener: TcpListener) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&request) {
                break;
            }
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .unwrap();
        String::from_utf8_lossy(&request).into_owned()
    })
}

#[test]
fn from_config_registers_configured_notifiers() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = accept_one_post(listener);

    let buffer = SharedBuffer::default();
    let mut config = LogConfig::default();
    config.notifiers.webhook_url = Some(format!("http://{addr}/hook"));

    let logger = Logger::from_config(&config, Arc::new(NoopMetrics));
    logger.set_writer(DefaultWriter::new(
        Box::new(buffer.clone()),
        Box::new(JsonFormatter),
    ));
    logger.warn("disk almost full", Metadata::new());
    logger.flush_notifiers(Duration::from_secs(5));

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /hook"));
    assert!(request.contains(r#""content":"#));
    assert!(request.contains("WARN - disk almost full"));
    assert_eq!(written(&buffer).len(), 1);
}
