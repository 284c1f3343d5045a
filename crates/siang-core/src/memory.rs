//! Process memory probing.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Reports the current process's resident memory.
///
/// Injected into [`crate::ModelLease`] so tests can simulate pressure
/// without allocating anything.
pub trait MemoryProbe: Send + Sync {
    /// Resident set size of this process, in bytes.
    fn resident_bytes(&self) -> Result<u64>;
}

/// `sysinfo`-backed probe for the current process.
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Result<u64> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| Error::ProbeFailed("probe lock poisoned".to_string()))?;
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        sys.process(self.pid)
            .map(|p| p.memory())
            .ok_or_else(|| Error::ProbeFailed(format!("process {} not visible", self.pid)))
    }
}
