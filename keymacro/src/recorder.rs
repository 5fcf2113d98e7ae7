use crate::{
    backend::{HookCallback, HookHandle, InputBackend, RawEventKind, RawInputEvent},
    keys::VirtualKey,
    MacroError, MacroItem, MacroSequence, MouseButton, Point, Result,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Configuration for the macro recorder
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// How long a single `pump_events` call may wait for input
    pub pump_timeout: Duration,

    /// Sleep between pumps when no input was pending
    pub idle_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            pump_timeout: Duration::from_millis(10),
            idle_interval: Duration::from_millis(10),
        }
    }
}

/// A captured raw input event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum RecordedEvent {
    KeyDown { key: VirtualKey },
    KeyUp { key: VirtualKey },
    MouseDown { button: MouseButton, position: Point },
    MouseUp { button: MouseButton, position: Point },
}

impl RecordedEvent {
    fn key(&self) -> Option<VirtualKey> {
        match self {
            RecordedEvent::KeyDown { key } | RecordedEvent::KeyUp { key } => Some(*key),
            _ => None,
        }
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordedEvent::KeyDown { key } => write!(f, "KeyDown {}", key),
            RecordedEvent::KeyUp { key } => write!(f, "KeyUp {}", key),
            RecordedEvent::MouseDown { button, position } => {
                write!(f, "MouseDown {} ({}, {})", button, position.x, position.y)
            }
            RecordedEvent::MouseUp { button, position } => {
                write!(f, "MouseUp {} ({}, {})", button, position.x, position.y)
            }
        }
    }
}

/// A recorded event with the milliseconds elapsed since the previous hook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroRecord {
    pub event: RecordedEvent,
    pub time_offset: u64,
}

impl fmt::Display for MacroRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:019}] {}", self.time_offset, self.event)
    }
}

struct Control {
    started: bool,
    stop_key: VirtualKey,
}

struct Capture {
    records: Vec<MacroRecord>,
    last_timestamp: Option<u64>,
    /// Set on every start; the first Enter release after it is platform noise
    leading_enter_armed: bool,
}

/// State shared between the owning thread and the hook callback.
/// Lock order is always `control` then `capture`.
struct RecorderShared {
    control: Mutex<Control>,
    capture: Mutex<Capture>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<MacroRecord>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecorderShared {
    fn is_started(&self) -> bool {
        lock(&self.control).started
    }

    fn on_event(&self, event: &RawInputEvent) {
        let stop_key = {
            let control = lock(&self.control);
            if !control.started {
                return;
            }
            control.stop_key
        };

        let mut capture = lock(&self.capture);
        let time_offset = capture
            .last_timestamp
            .map_or(0, |last| event.timestamp.saturating_sub(last));
        capture.last_timestamp = Some(event.timestamp);

        let recorded = match event.kind {
            RawEventKind::KeyDown { key, .. } if stop_key.matches(key) => {
                drop(capture);
                lock(&self.control).started = false;
                info!("Stop key {} pressed, recording finished", key);
                return;
            }
            RawEventKind::KeyDown { key, .. } => RecordedEvent::KeyDown { key },
            RawEventKind::KeyUp { key, .. } => RecordedEvent::KeyUp { key },
            RawEventKind::ButtonDown { button, point } => match button.recordable() {
                Some(button) => RecordedEvent::MouseDown { button, position: point },
                None => return,
            },
            RawEventKind::ButtonUp { button, point } => match button.recordable() {
                Some(button) => RecordedEvent::MouseUp { button, position: point },
                None => return,
            },
            RawEventKind::MouseMove { .. } | RawEventKind::Wheel { .. } => return,
        };

        if let Some(key) = recorded.key() {
            if capture.leading_enter_armed {
                if key == VirtualKey::ENTER {
                    if matches!(recorded, RecordedEvent::KeyUp { .. }) {
                        capture.leading_enter_armed = false;
                    }
                    debug!("Ignoring leading {}", recorded);
                    return;
                }
                capture.leading_enter_armed = false;
            }
        }

        let record = MacroRecord {
            event: recorded,
            time_offset,
        };
        capture.records.push(record);
        debug!("Recorded {}", record);

        // Sent while the buffer lock is held so observers see record order
        lock(&self.subscribers).retain(|tx| tx.send(record).is_ok());
    }
}

/// Records raw input from a backend hook and turns it into macro items
pub struct MacroRecorder {
    backend: Arc<dyn InputBackend>,
    shared: Arc<RecorderShared>,
    hook: Option<HookHandle>,
    config: RecorderConfig,
}

impl MacroRecorder {
    /// Install the recorder's hook. The hook stays installed until `close` or drop.
    pub fn install(backend: Arc<dyn InputBackend>, config: RecorderConfig) -> Result<Self> {
        let shared = Arc::new(RecorderShared {
            control: Mutex::new(Control {
                started: false,
                stop_key: VirtualKey::UNRESOLVED,
            }),
            capture: Mutex::new(Capture {
                records: Vec::new(),
                last_timestamp: None,
                leading_enter_armed: true,
            }),
            subscribers: Mutex::new(Vec::new()),
        });

        let hook_shared = Arc::clone(&shared);
        let callback: HookCallback = Arc::new(move |event: &RawInputEvent| hook_shared.on_event(event));
        let hook = backend.install_hook(callback)?;
        debug!("Recorder hook installed: {:?}", hook);

        Ok(Self {
            backend,
            shared,
            hook: Some(hook),
            config,
        })
    }

    pub fn is_started(&self) -> bool {
        self.shared.is_started()
    }

    /// The stop key of the current or last session
    pub fn stop_key(&self) -> Option<VirtualKey> {
        Some(lock(&self.shared.control).stop_key).filter(|key| key.is_resolved())
    }

    pub fn recorded_count(&self) -> usize {
        lock(&self.shared.capture).records.len()
    }

    /// Snapshot of the buffered records
    pub fn records(&self) -> Vec<MacroRecord> {
        lock(&self.shared.capture).records.clone()
    }

    /// Receive every record added from now on, in record order
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MacroRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    /// Get a stream of records added from now on
    pub fn record_stream(&self) -> impl Stream<Item = MacroRecord> {
        let mut rx = self.subscribe();
        Box::pin(async_stream::stream! {
            while let Some(record) = rx.recv().await {
                yield record;
            }
        })
    }

    /// Record until `stop_key` goes down.
    ///
    /// Blocks the calling thread, pumping the backend's event queue. That must
    /// be the thread the hook was installed on. With `append` the previous
    /// records are kept and time offsets continue from the last event.
    pub fn start(&self, stop_key: VirtualKey, append: bool) -> Result<()> {
        if self.hook.is_none() {
            return Err(MacroError::ConfigurationError(
                "the recorder has been closed".to_string(),
            ));
        }
        if !stop_key.is_resolved() {
            return Err(MacroError::ConfigurationError(
                "a valid stop key is required".to_string(),
            ));
        }

        {
            let mut control = lock(&self.shared.control);
            if control.started {
                return Err(MacroError::ConfigurationError(
                    "the recorder is already started".to_string(),
                ));
            }
            let mut capture = lock(&self.shared.capture);
            if !append {
                capture.records.clear();
                capture.last_timestamp = None;
            }
            capture.leading_enter_armed = true;
            control.stop_key = stop_key;
            control.started = true;
        }

        info!("Recording started, press {} to stop", stop_key);
        while self.shared.is_started() {
            if !self.backend.pump_events(self.config.pump_timeout) {
                thread::sleep(self.config.idle_interval);
            }
        }
        info!("Recording stopped with {} records", self.recorded_count());
        Ok(())
    }

    /// Translate the buffered records into items appended to `sequence`.
    ///
    /// Repeated key-downs of a key that is already held are dropped; a Wait is
    /// emitted before every record with a non-zero offset.
    pub fn append_sequence(&self, sequence: &mut MacroSequence) -> Result<()> {
        if self.is_started() {
            return Err(MacroError::ConfigurationError(
                "cannot build a sequence while recording is in progress".to_string(),
            ));
        }
        let window = sequence.target_window().to_string();
        if window.is_empty() {
            return Err(MacroError::ConfigurationError(
                "cannot work on a sequence not targeting any window".to_string(),
            ));
        }

        let records = self.records();
        let before = sequence.len();
        let mut pressed: HashSet<VirtualKey> = HashSet::new();

        for record in &records {
            if record.time_offset > 0 {
                sequence.add_item(MacroItem::wait(record.time_offset));
            }

            match record.event {
                RecordedEvent::KeyDown { key } => {
                    if !pressed.insert(key) {
                        continue;
                    }
                    sequence.add_item(MacroItem::press_key(&window, &key.to_string()));
                }
                RecordedEvent::KeyUp { key } => {
                    pressed.remove(&key);
                    sequence.add_item(MacroItem::release_key(&window, &key.to_string()));
                }
                RecordedEvent::MouseDown { button, position } => {
                    sequence.add_item(MacroItem::press_button(&window, button, position));
                }
                RecordedEvent::MouseUp { button, position } => {
                    sequence.add_item(MacroItem::release_button(&window, button, position));
                }
            }
        }

        info!(
            "Translated {} records into {} items for \"{}\"",
            records.len(),
            sequence.len() - before,
            window
        );
        Ok(())
    }

    /// Build a new sequence for `target_window` from the buffered records
    pub fn to_sequence(&self, target_window: &str) -> Result<MacroSequence> {
        let mut sequence = MacroSequence::new(target_window)?;
        self.append_sequence(&mut sequence)?;
        Ok(sequence)
    }

    /// Serialize the buffered records to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records())?)
    }

    /// Save the buffered records as JSON
    pub fn save_records<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("Saving raw recording to {:?}", path.as_ref());
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Uninstall the hook
    pub fn close(&mut self) -> Result<()> {
        if let Some(hook) = self.hook.take() {
            lock(&self.shared.subscribers).clear();
            self.backend.uninstall(hook)?;
            debug!("Recorder hook {:?} uninstalled", hook);
        }
        Ok(())
    }
}

impl Drop for MacroRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to uninstall recorder hook: {}", e);
        }
    }
}
