//! Broadcaster that writes each message as one JSON line.

use std::io::Write;
use std::sync::Mutex;

use taskwatch_repo_sync::{Broadcaster, SyncMessage};
use tracing::warn;

pub struct JsonLinesBroadcaster<W> {
    writer: Mutex<W>,
}

impl JsonLinesBroadcaster<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesBroadcaster<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Broadcaster for JsonLinesBroadcaster<W> {
    fn send(&self, message: SyncMessage) {
        let Ok(mut writer) = self.writer.lock() else {
            warn!("Output writer poisoned, dropping {:?}", message.event);
            return;
        };

        let written = serde_json::to_writer(&mut *writer, &message)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(writer))
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            warn!("Failed to write {:?}: {e}", message.event);
        }
    }

    /// The single consumer is whoever reads the output.
    fn subscriber_count(&self) -> usize {
        1
    }
}
