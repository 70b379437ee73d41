//! Emergency signal polling.
//!
//! The kill switch collaborator drops a marker file when the operator pulls
//! the panic toggle and removes it to clear. The core only ever reads it.

use std::path::PathBuf;

use crate::error::PrismError;

/// Source of the emergency condition, polled once per audio block.
///
/// Implementations must not block: they run inside the realtime loop.
pub trait PanicSource: Send {
    fn is_panic(&mut self) -> bool;
}

/// Panic signalled by the existence of a marker file.
#[derive(Debug)]
pub struct MarkerFileMonitor {
    path: PathBuf,
    last_observed: bool,
}

impl MarkerFileMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_observed: false,
        }
    }
}

impl PanicSource for MarkerFileMonitor {
    fn is_panic(&mut self) -> bool {
        match self.path.try_exists() {
            Ok(present) => {
                self.last_observed = present;
                present
            }
            Err(e) => {
                // Keep the previous observation so a flaky stat does not flap the mode
                let err = PrismError::MarkerRead(e);
                log::debug!(
                    "{} ({}), keeping panic={}",
                    err,
                    self.path.display(),
                    self.last_observed
                );
                self.last_observed
            }
        }
    }
}
