use std::io::{self, Write};
use std::time::Duration;

use pinlog::{
    AppError, DualSink, EdgeKind, EdgeWatcher, Level, MemorySink, MockGpioBackend, MockLine,
    PinConfig, PinRegistry, TriggerEvent, TriggerLogger, channel,
};

fn door_configs() -> Vec<PinConfig> {
    vec![
        PinConfig::new("Front Door", "GPIO4", "Up", "Rising"),
        PinConfig::new("Back Door", "GPIO17", "Down", "Falling"),
    ]
}

fn door_backend() -> MockGpioBackend {
    MockGpioBackend::with_lines(&["GPIO4", "GPIO17"])
}

async fn wait_for_blocks(sink: &MemorySink, count: usize) -> Vec<Vec<String>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let blocks = sink.blocks();
        if blocks.len() >= count || tokio::time::Instant::now() >= deadline {
            return blocks;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn start(
    registry: PinRegistry<MockLine>,
    sink: MemorySink,
) -> (Vec<EdgeWatcher>, tokio::task::JoinHandle<AppError>) {
    let (notify, notifications) = channel();
    let watchers = EdgeWatcher::spawn_all(&registry, &notify).unwrap();
    drop(notify);

    let logger = TriggerLogger::new(registry, sink);
    let task = tokio::spawn(async move { logger.run(notifications).await });
    (watchers, task)
}

#[tokio::test]
async fn one_watcher_per_pin() {
    let backend = MockGpioBackend::with_lines(&["GPIO4", "GPIO17", "GPIO27"]);
    let mut configs = door_configs();
    configs.push(PinConfig::new("Garage", "GPIO27", "Float", "Both"));
    let registry = PinRegistry::resolve_all(&backend, &configs).unwrap();

    let (watchers, task) = start(registry, MemorySink::default());

    let pins: Vec<&str> = watchers.iter().map(|w| w.pin()).collect();
    assert_eq!(pins, ["Front Door", "Back Door", "Garage"]);
    assert!(watchers.iter().all(|w| w.is_running()));
    task.abort();
}

#[tokio::test]
async fn single_trigger_logs_one_block_in_config_order() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let sink = MemorySink::default();
    let (_watchers, task) = start(registry, sink.clone());

    // falling edge is not what Front Door waits for
    backend.set_level("GPIO4", Level::Low).unwrap();
    backend.set_level("GPIO4", Level::High).unwrap();

    let blocks = wait_for_blocks(&sink, 1).await;
    assert_eq!(
        blocks,
        vec![vec![
            "Pin triggered: Front Door (rising)".to_string(),
            "\tFront Door: High".to_string(),
            "\tBack Door: Low".to_string(),
        ]]
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.blocks().len(), 1);
    task.abort();
}

#[tokio::test]
async fn read_error_degrades_one_line_only() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let sink = MemorySink::default();
    let (_watchers, task) = start(registry, sink.clone());

    backend.fail_reads("GPIO17", Some("bus glitch")).unwrap();
    backend.set_level("GPIO4", Level::Low).unwrap();
    backend.set_level("GPIO4", Level::High).unwrap();

    let blocks = wait_for_blocks(&sink, 1).await;
    assert_eq!(blocks.len(), 1);
    let block = &blocks[0];
    assert_eq!(block.len(), 3);
    assert_eq!(block[0], "Pin triggered: Front Door (rising)");
    assert_eq!(block[1], "\tFront Door: High");
    assert!(block[2].starts_with("\tBack Door: ERROR"));
    assert!(block[2].contains("bus glitch"));

    // logger is still alive and the line recovers
    backend.fail_reads("GPIO17", None).unwrap();
    backend.set_level("GPIO4", Level::Low).unwrap();
    backend.set_level("GPIO4", Level::High).unwrap();

    let blocks = wait_for_blocks(&sink, 2).await;
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1][2], "\tBack Door: Low");
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test]
async fn edge_mode_none_never_triggers() {
    let backend = MockGpioBackend::with_lines(&["GPIO4", "GPIO17", "GPIO5"]);
    let mut configs = door_configs();
    configs.push(PinConfig::new("Porch Light", "GPIO5", "NoChange", "None"));
    let registry = PinRegistry::resolve_all(&backend, &configs).unwrap();
    let sink = MemorySink::default();
    let (watchers, task) = start(registry, sink.clone());

    for _ in 0..5 {
        backend.set_level("GPIO5", Level::High).unwrap();
        backend.set_level("GPIO5", Level::Low).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.blocks().is_empty());
    assert!(watchers[2].is_running());

    backend.set_level("GPIO5", Level::High).unwrap();
    backend.set_level("GPIO17", Level::High).unwrap();
    backend.set_level("GPIO17", Level::Low).unwrap();

    let blocks = wait_for_blocks(&sink, 1).await;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0][0], "Pin triggered: Back Door (falling)");
    assert_eq!(blocks[0][3], "\tPorch Light: High");
    task.abort();
}

#[tokio::test]
async fn same_pin_events_keep_their_order() {
    let backend = MockGpioBackend::with_lines(&["GPIO4"]);
    let configs = vec![PinConfig::new("Motion", "GPIO4", "Down", "Both")];
    let registry = PinRegistry::resolve_all(&backend, &configs).unwrap();
    let sink = MemorySink::default();
    let (_watchers, task) = start(registry, sink.clone());

    backend.set_level("GPIO4", Level::High).unwrap();
    backend.set_level("GPIO4", Level::Low).unwrap();
    backend.set_level("GPIO4", Level::High).unwrap();

    let blocks = wait_for_blocks(&sink, 3).await;
    let triggers: Vec<&str> = blocks.iter().map(|b| b[0].as_str()).collect();
    assert_eq!(
        triggers,
        [
            "Pin triggered: Motion (rising)",
            "Pin triggered: Motion (falling)",
            "Pin triggered: Motion (rising)",
        ]
    );
    task.abort();
}

#[tokio::test]
async fn wait_failure_stops_the_logger() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let (_watchers, task) = start(registry, MemorySink::default());

    backend.fail_wait("GPIO17", "device gone").unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("logger returns")
        .unwrap();
    assert!(err.is_fatal());
    match err {
        AppError::HardwareWait { line, reason } => {
            assert_eq!(line, "GPIO17");
            assert_eq!(reason, "device gone");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn logger_ends_when_every_sender_is_gone() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let (notify, notifications) = channel();
    drop(notify);

    let logger = TriggerLogger::new(registry, MemorySink::default());
    let err = logger.run(notifications).await;
    assert!(matches!(err, AppError::ChannelClosed));
}

#[test]
fn snapshot_reads_current_levels() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let logger = TriggerLogger::new(registry, MemorySink::default());

    backend.set_level("GPIO17", Level::High).unwrap();
    let event = TriggerEvent {
        name: "Back Door".to_string(),
        edge: EdgeKind::Rising,
    };
    assert_eq!(
        logger.snapshot(&event),
        [
            "Pin triggered: Back Door (rising)",
            "\tFront Door: High",
            "\tBack Door: High",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_triggers_never_interleave() {
    const TOGGLES: usize = 25;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pins.log");
    let sink = DualSink::with_console(io::sink(), &path).unwrap();

    let backend = std::sync::Arc::new(door_backend());
    let configs = vec![
        PinConfig::new("Front Door", "GPIO4", "Up", "Both"),
        PinConfig::new("Back Door", "GPIO17", "Down", "Both"),
    ];
    let registry = PinRegistry::resolve_all(backend.as_ref(), &configs).unwrap();

    let (notify, notifications) = channel();
    let _watchers = EdgeWatcher::spawn_all(&registry, &notify).unwrap();
    drop(notify);
    let logger = TriggerLogger::new(registry, sink.clone());
    let task = tokio::spawn(async move { logger.run(notifications).await });

    let drivers: Vec<_> = ["GPIO4", "GPIO17"]
        .into_iter()
        .map(|id| {
            let backend = backend.clone();
            std::thread::spawn(move || {
                for i in 0..TOGGLES {
                    let level = if i % 2 == 0 { Level::Low } else { Level::High };
                    let level = if id == "GPIO4" { level } else { flip(level) };
                    backend.set_level(id, level).unwrap();
                }
            })
        })
        .collect();
    // unrelated writer on the same sink
    let mut noise = sink.clone();
    let noisy = std::thread::spawn(move || {
        for _ in 0..TOGGLES {
            noise.write_all(b"noise\n").unwrap();
        }
    });
    for d in drivers {
        d.join().unwrap();
    }
    noisy.join().unwrap();

    let expected_blocks = TOGGLES * 2;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let contents = loop {
        let contents = std::fs::read_to_string(&path).unwrap();
        let triggers = contents.matches("Pin triggered:").count();
        if triggers >= expected_blocks || std::time::Instant::now() >= deadline {
            break contents;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    task.abort();

    let lines: Vec<&str> = contents.lines().collect();
    let mut blocks = 0;
    let mut i = 0;
    while i < lines.len() {
        if lines[i].contains("Pin triggered:") {
            assert!(lines[i + 1].contains("\tFront Door: "), "split block: {:?}", &lines[i..]);
            assert!(lines[i + 2].contains("\tBack Door: "), "split block: {:?}", &lines[i..]);
            blocks += 1;
            i += 3;
        } else {
            assert_eq!(lines[i], "noise");
            i += 1;
        }
    }
    assert_eq!(blocks, expected_blocks);
}

fn flip(level: Level) -> Level {
    match level {
        Level::Low => Level::High,
        Level::High => Level::Low,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_on_a_multi_thread_runtime() {
    let backend = door_backend();
    let registry = PinRegistry::resolve_all(&backend, &door_configs()).unwrap();
    let sink = MemorySink::default();
    let (_watchers, task) = start(registry, sink.clone());

    backend.set_level("GPIO17", Level::High).unwrap();
    backend.set_level("GPIO17", Level::Low).unwrap();

    let blocks = wait_for_blocks(&sink, 1).await;
    assert_eq!(
        blocks,
        vec![vec![
            "Pin triggered: Back Door (falling)".to_string(),
            "\tFront Door: High".to_string(),
            "\tBack Door: Low".to_string(),
        ]]
    );
    assert!(!task.is_finished());
    task.abort();
}
