//! External-process similarity backend.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use siang_core::{AcousticModel, Error, ModelLoader, Result};

/// Loads a similarity backend that lives in an external executable.
///
/// The executable is invoked as `<program> <audio> <reference>` and must
/// print a similarity ratio in `[0, 1]` on stdout. With no program
/// configured, loading fails and the pipeline falls through to the
/// synthetic strategy.
pub struct CommandModelLoader {
    program: Option<PathBuf>,
}

impl CommandModelLoader {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }
}

impl ModelLoader for CommandModelLoader {
    fn load(&self) -> Result<Box<dyn AcousticModel>> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| Error::LoadFailed("No local backend configured".to_string()))?;

        if !program.exists() {
            return Err(Error::LoadFailed(format!(
                "Backend {} not found",
                program.display()
            )));
        }

        Ok(Box::new(CommandModel { program }))
    }
}

struct CommandModel {
    program: PathBuf,
}

impl AcousticModel for CommandModel {
    fn similarity(&self, audio: &Path, reference: &Path) -> Result<f32> {
        debug!(
            "Running {} {} {}",
            self.program.display(),
            audio.display(),
            reference.display()
        );

        let output = Command::new(&self.program).arg(audio).arg(reference).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InferenceError(format!(
                "Backend exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<f32>().map_err(|_| {
            Error::InferenceError(format!("Backend printed invalid ratio: {:?}", stdout.trim()))
        })
    }
}
