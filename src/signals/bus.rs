//! Live bus read/write capability supplied by the HIL connection layer.

use std::collections::HashMap;

use super::catalog::ChannelPath;
use super::value::SignalValue;
use crate::core::errors::{HarnessError, Result};

/// Read/write access to physical channels. Only used in live mode.
///
/// Implementations report transport problems as
/// [`HarnessError::Connection`]; the harness treats those as fatal for the
/// scenario.
pub trait LiveBus: Send {
    /// Drive a command channel.
    fn write(&mut self, path: &ChannelPath, value: &SignalValue) -> Result<()>;
    /// Sample a channel.
    fn read(&mut self, path: &ChannelPath) -> Result<SignalValue>;
}

/// In-memory channel table.
///
/// Unwritten channels read as `Float(0.0)`, like an idle rig. Every write is
/// kept in order for assertions.
#[derive(Debug, Default)]
pub struct MemoryBus {
    channels: HashMap<ChannelPath, SignalValue>,
    writes: Vec<(ChannelPath, SignalValue)>,
    disconnected: bool,
}

impl MemoryBus {
    /// Idle bus with every channel at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a channel value, e.g. a status the controller already reports.
    #[must_use]
    pub fn with_channel(mut self, path: &str, value: SignalValue) -> Self {
        self.channels.insert(ChannelPath::new(path), value);
        self
    }

    /// All writes in order.
    #[must_use]
    pub fn writes(&self) -> &[(ChannelPath, SignalValue)] {
        &self.writes
    }

    /// Make every subsequent read/write fail as a lost connection.
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }
}

impl LiveBus for MemoryBus {
    fn write(&mut self, path: &ChannelPath, value: &SignalValue) -> Result<()> {
        if self.disconnected {
            return Err(HarnessError::connection(format!("write to {path} on a disconnected bus")));
        }
        self.channels.insert(path.clone(), value.clone());
        self.writes.push((path.clone(), value.clone()));
        Ok(())
    }

    fn read(&mut self, path: &ChannelPath) -> Result<SignalValue> {
        if self.disconnected {
            return Err(HarnessError::connection(format!("read of {path} on a disconnected bus")));
        }
        Ok(self
            .channels
            .get(path)
            .cloned()
            .unwrap_or(SignalValue::Float(0.0)))
    }
}
