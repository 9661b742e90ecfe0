use parking_lot::Mutex;
use scopecfg_protocol::{ConfigEvent, ConfigEventSink};

/// Event sink that keeps every emitted event.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ConfigEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConfigEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<ConfigEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ConfigEventSink for RecordingEventSink {
    fn emit(&self, event: ConfigEvent) {
        self.events.lock().push(event);
    }
}
