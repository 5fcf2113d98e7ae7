use keymacro::backend::{RawEventKind, RawInputEvent, SyntheticEvent};
use keymacro::*;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;

const NOTEPAD_MACRO: &str = "Target \"Notepad\"\nPressKey A\nWait 100\nReleaseKey A\n";

fn key_down(timestamp: u64, name: &str) -> RawInputEvent {
    RawInputEvent::new(
        timestamp,
        RawEventKind::KeyDown { key: VirtualKey::resolve(name), system: false },
    )
}

fn key_up(timestamp: u64, name: &str) -> RawInputEvent {
    RawInputEvent::new(
        timestamp,
        RawEventKind::KeyUp { key: VirtualKey::resolve(name), system: false },
    )
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_macro_save_load_roundtrip() {
    use tempfile::tempdir;

    let mut sequence = MacroSequence::new("Untitled - Notepad").unwrap();
    sequence.add_item(MacroItem::send_key("Untitled - Notepad", "enter"));
    sequence.add_item(MacroItem::press_key("Untitled - Notepad", "LeftShift"));
    sequence.add_item(MacroItem::wait(250));
    sequence.add_item(MacroItem::release_key("Untitled - Notepad", "0xE7"));
    sequence.add_item(MacroItem::press_button("Untitled - Notepad", MouseButton::Left, Point::new(-4, 900)));
    sequence.add_item(MacroItem::release_button("Untitled - Notepad", MouseButton::Right, Point::new(12, 13)));

    let dir = tempdir().unwrap();
    let path = dir.path().join("notepad.macro");
    sequence.save_to_file(&path).unwrap();

    let loaded = MacroSequence::load_from_file(&path).unwrap();
    assert_eq!(loaded, sequence);
    assert_eq!(loaded.to_text(), sequence.to_text());
}

#[test]
fn test_notepad_macro_file() {
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let path = dir.path().join("hi.macro");
    std::fs::write(&path, NOTEPAD_MACRO).unwrap();

    let sequence = MacroSequence::load_from_file(&path).unwrap();
    assert_eq!(sequence.target_window(), "Notepad");
    assert_eq!(sequence.len(), 3);
    assert_eq!(sequence.get(0), Some(&MacroItem::press_key("Notepad", "A")));
    assert_eq!(sequence.get(1), Some(&MacroItem::wait(100)));
    assert_eq!(sequence.get(2), Some(&MacroItem::release_key("Notepad", "A")));
    assert_eq!(sequence.to_text(), NOTEPAD_MACRO);
}

#[test]
fn test_missing_file_is_not_found() {
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.macro");
    match MacroSequence::load_from_file(&path) {
        Err(MacroError::NotFound(reported)) => assert_eq!(reported, path),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_malformed_files_are_rejected() {
    let unknown = MacroSequence::parse("Target \"Notepad\"\nFly up\n");
    assert!(matches!(
        unknown,
        Err(MacroError::ParseError { line: 2, kind: ParseErrorKind::UnsupportedAction(ref verb) }) if verb == "Fly"
    ));

    let bad_wait = MacroSequence::parse("Target \"Notepad\"\nWait abc\n");
    assert!(matches!(
        bad_wait,
        Err(MacroError::ParseError {
            line: 2,
            kind: ParseErrorKind::InvalidParameters { action: MacroAction::Wait, .. }
        })
    ));
}

#[test]
fn test_wait_execute_is_repeatable() {
    let backend = FakeBackend::new();
    let mut item = MacroItem::wait(5);
    for _ in 0..3 {
        let started = Instant::now();
        assert!(item.execute(&backend));
        assert!(started.elapsed() >= Duration::from_millis(5));
        assert_eq!(item.last_error(), 0);
    }
    assert!(backend.posted_events().is_empty());
}

#[test]
fn test_duplicate_key_down_is_suppressed() {
    let backend = Arc::new(FakeBackend::new());
    let recorder = MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap();
    backend.queue_events(vec![
        key_down(0, "A"),
        key_down(0, "A"),
        key_down(0, "A"),
        key_up(0, "A"),
        key_down(0, "Escape"),
    ]);
    recorder.start(VirtualKey::ESCAPE, false).unwrap();

    let sequence = recorder.to_sequence("Notepad").unwrap();
    assert_eq!(sequence.to_text(), "Target \"Notepad\"\nPressKey A\nReleaseKey A\n");
}

#[test]
fn test_leading_enter_is_not_recorded() {
    let backend = Arc::new(FakeBackend::new());
    let recorder = MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap();
    backend.queue_events(vec![
        key_down(0, "Enter"),
        key_up(0, "Enter"),
        key_down(0, "X"),
        key_up(0, "X"),
        key_down(0, "Escape"),
    ]);
    recorder.start(VirtualKey::ESCAPE, false).unwrap();

    let sequence = recorder.to_sequence("Notepad").unwrap();
    let lines: Vec<String> = sequence.iter().map(|item| item.to_string()).collect();
    assert_eq!(lines, vec!["PressKey X", "ReleaseKey X"]);
}

#[test]
fn test_recorder_rejects_calls_while_started() {
    let backend = Arc::new(FakeBackend::new());
    let recorder =
        Arc::new(MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap());

    let session = {
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || recorder.start(VirtualKey::ESCAPE, false))
    };
    wait_until(|| recorder.is_started());

    assert!(matches!(
        recorder.start(VirtualKey::ESCAPE, false),
        Err(MacroError::ConfigurationError(_))
    ));
    let mut sequence = MacroSequence::new("Notepad").unwrap();
    assert!(matches!(
        recorder.append_sequence(&mut sequence),
        Err(MacroError::ConfigurationError(_))
    ));

    backend.emit(&key_down(0, "Escape"));
    session.join().unwrap().unwrap();
    assert!(!recorder.is_started());
    recorder.append_sequence(&mut sequence).unwrap();
}

#[tokio::test]
async fn test_record_stream_follows_record_order() {
    let backend = Arc::new(FakeBackend::new());
    let mut recorder = MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap();
    let stream = recorder.record_stream();

    backend.queue_events(vec![
        key_down(10, "A"),
        key_up(20, "A"),
        key_down(35, "B"),
        key_up(60, "B"),
        key_down(61, "Escape"),
    ]);
    recorder.start(VirtualKey::ESCAPE, false).unwrap();
    let recorded = recorder.records();
    recorder.close().unwrap();

    let streamed: Vec<MacroRecord> = stream.collect().await;
    assert_eq!(streamed, recorded);
    let offsets: Vec<u64> = streamed.iter().map(|r| r.time_offset).collect();
    assert_eq!(offsets, vec![0, 10, 15, 25]);
}

#[test]
fn test_hook_is_uninstalled_on_drop() {
    let backend = Arc::new(FakeBackend::new());
    {
        let _recorder = MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap();
        assert_eq!(backend.installed_hooks(), 1);
    }
    assert_eq!(backend.installed_hooks(), 0);
    assert_eq!(backend.uninstalled_hooks().len(), 1);
}

#[test]
fn test_record_then_play_back() {
    let backend = Arc::new(FakeBackend::new());
    let window = backend.add_window("Untitled - Notepad", Point::new(100, 200));

    let recorder = MacroRecorder::install(backend.clone(), RecorderConfig::default()).unwrap();
    backend.queue_events(vec![
        key_down(0, "H"),
        key_up(0, "H"),
        RawInputEvent::new(
            0,
            RawEventKind::ButtonDown {
                button: keymacro::backend::PointerButton::Left,
                point: Point::new(150, 260),
            },
        ),
        key_down(0, "Escape"),
    ]);
    recorder.start(VirtualKey::ESCAPE, false).unwrap();
    let mut sequence = recorder.to_sequence("Untitled - Notepad").unwrap();

    let config = PlaybackConfig {
        item_interval: Duration::ZERO,
        iteration_pause: Duration::ZERO,
        ..PlaybackConfig::default()
    };
    let report = Player::new(backend.clone(), config).run(&mut sequence, &AtomicBool::new(false));

    assert!(report.is_success());
    assert_eq!(report.items_executed, 3);
    assert_eq!(backend.foreground(), Some(window));
    assert_eq!(
        backend.posted_events(),
        vec![
            (window, SyntheticEvent::KeyDown(VirtualKey::resolve("H"))),
            (window, SyntheticEvent::KeyUp(VirtualKey::resolve("H"))),
            (
                window,
                SyntheticEvent::ButtonDown { button: MouseButton::Left, point: Point::new(50, 60) }
            ),
        ]
    );
}

#[test]
fn test_missing_window_fails_with_platform_code() {
    let backend = FakeBackend::new();
    let mut item = MacroItem::press_key("Nowhere", "A");
    assert!(!item.execute(&backend));
    assert_ne!(item.last_error(), 0);
    assert!(backend.posted_events().is_empty());
}

#[test]
fn test_unstorable_text_never_reaches_disk() {
    use tempfile::tempdir;

    assert!(matches!(
        MacroSequence::new("Say \"hi\" - Notepad"),
        Err(MacroError::ConfigurationError(_))
    ));

    let dir = tempdir().unwrap();
    let path = dir.path().join("page.macro");
    let mut sequence = MacroSequence::new("Notepad").unwrap();
    sequence.add_item(MacroItem::press_key("Notepad", "page up"));
    assert!(matches!(
        sequence.save_to_file(&path),
        Err(MacroError::ConfigurationError(_))
    ));
    assert!(!path.exists());

    sequence.clear();
    sequence.add_item(MacroItem::press_key("Notepad", "PageUp"));
    sequence.save_to_file(&path).unwrap();
    assert_eq!(MacroSequence::load_from_file(&path).unwrap(), sequence);
}
