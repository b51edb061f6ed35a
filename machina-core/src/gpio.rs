//! GPIO line helpers: input line arrays fan out to a single handler,
//! output lines are wired individually to external sinks.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Called with the firing device, the line index, and the new logic level.
pub type GpioHandler = Arc<dyn Fn(usize, bool) + Send + Sync>;
/// An external sink an output line can be wired to.
pub type GpioSink = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    AlreadyInitialized,
    NotInitialized,
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpioError::AlreadyInitialized => write!(f, "gpio array already initialized"),
            GpioError::NotInitialized => write!(f, "gpio array not initialized"),
            GpioError::IndexOutOfRange { index, len } => {
                write!(f, "gpio index {index} out of range (0..{len})")
            }
        }
    }
}

impl std::error::Error for GpioError {}

struct InputArray {
    handler: GpioHandler,
    count: usize,
}

/// The input and output GPIO line arrays owned by one device.
pub struct GpioLines {
    input: RwLock<Option<InputArray>>,
    output: RwLock<Vec<Option<GpioSink>>>,
}

impl GpioLines {
    pub fn new() -> Self {
        GpioLines {
            input: RwLock::new(None),
            output: RwLock::new(Vec::new()),
        }
    }

    /// Allocates `n` input lines bound to `handler`. May only be called once.
    pub fn init_input(&self, handler: GpioHandler, n: usize) -> Result<(), GpioError> {
        let mut slot = self.input.write().unwrap();
        if slot.is_some() {
            return Err(GpioError::AlreadyInitialized);
        }
        *slot = Some(InputArray { handler, count: n });
        Ok(())
    }

    /// Fires input line `index`, invoking the registered handler.
    pub fn fire_input(&self, index: usize, level: bool) -> Result<(), GpioError> {
        let slot = self.input.read().unwrap();
        let array = slot.as_ref().ok_or(GpioError::NotInitialized)?;
        if index >= array.count {
            return Err(GpioError::IndexOutOfRange { index, len: array.count });
        }
        (array.handler)(index, level);
        Ok(())
    }

    pub fn input_len(&self) -> usize {
        self.input.read().unwrap().as_ref().map(|a| a.count).unwrap_or(0)
    }

    /// Allocates `n` unconnected output lines.
    pub fn init_output(&self, n: usize) {
        let mut slot = self.output.write().unwrap();
        slot.resize_with(n, || None);
    }

    /// Wires output line `index` to `sink`; may be called repeatedly.
    pub fn connect_output(&self, index: usize, sink: GpioSink) -> Result<(), GpioError> {
        let mut slot = self.output.write().unwrap();
        let len = slot.len();
        let line = slot.get_mut(index).ok_or(GpioError::IndexOutOfRange { index, len })?;
        *line = Some(sink);
        Ok(())
    }

    /// Raises output line `index` to `level`, invoking its sink if connected.
    pub fn raise_output(&self, index: usize, level: bool) -> Result<(), GpioError> {
        let slot = self.output.read().unwrap();
        let len = slot.len();
        let line = slot.get(index).ok_or(GpioError::IndexOutOfRange { index, len })?;
        if let Some(sink) = line {
            sink(level);
        }
        Ok(())
    }

    pub fn output_len(&self) -> usize {
        self.output.read().unwrap().len()
    }
}

impl Default for GpioLines {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn input_handler_fires_once_per_line() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        let lines = GpioLines::new();
        lines
            .init_input(Arc::new(move |_idx, level| seen2.store(level, Ordering::SeqCst)), 2)
            .unwrap();
        lines.fire_input(1, true).unwrap();
        assert!(seen.load(Ordering::SeqCst));
        assert!(lines.fire_input(5, true).is_err());
    }

    #[test]
    fn init_input_twice_is_rejected() {
        let lines = GpioLines::new();
        lines.init_input(Arc::new(|_, _| {}), 1).unwrap();
        assert_eq!(lines.init_input(Arc::new(|_, _| {}), 1), Err(GpioError::AlreadyInitialized));
    }

    #[test]
    fn output_lines_can_be_rewired() {
        let lines = GpioLines::new();
        lines.init_output(2);
        let hit = Arc::new(AtomicBool::new(false));
        let hit2 = hit.clone();
        lines.connect_output(0, Arc::new(move |level| hit2.store(level, Ordering::SeqCst))).unwrap();
        lines.raise_output(0, true).unwrap();
        assert!(hit.load(Ordering::SeqCst));
    }
}
