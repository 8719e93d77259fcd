//! Line sink for build output.

use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use berth_common::BerthResult;

/// Receives build output one line at a time.
///
/// Every line is traced at `debug` under the `berth::build` target. When a
/// log file is configured the line is also written there; the file is
/// truncated on open and flushed when the sink is finished or dropped.
#[derive(Debug)]
pub struct BuildLog {
    file: Option<(PathBuf, LineWriter<File>)>,
}

impl BuildLog {
    /// A sink that only traces.
    #[must_use]
    pub const fn trace_only() -> Self {
        Self { file: None }
    }

    /// A sink that traces and, if `path` is set, writes to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn open(path: Option<&Path>) -> BerthResult<Self> {
        let Some(path) = path else {
            return Ok(Self::trace_only());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;

        tracing::debug!(path = %path.display(), "Writing build log");

        Ok(Self {
            file: Some((path.to_path_buf(), LineWriter::new(file))),
        })
    }

    /// Record one line of output.
    pub fn line(&mut self, line: &str) {
        tracing::debug!(target: "berth::build", "{line}");

        let failed = match &mut self.file {
            Some((path, writer)) => writeln!(writer, "{line}")
                .map_err(|e| (path.clone(), e))
                .err(),
            None => None,
        };

        if let Some((path, e)) = failed {
            tracing::warn!(path = %path.display(), error = %e, "Build log write failed, disabling");
            self.file = None;
        }
    }

    /// Flush and close the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(mut self) -> BerthResult<()> {
        if let Some((_, mut writer)) = self.file.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for BuildLog {
    fn drop(&mut self) {
        if let Some((path, writer)) = &mut self.file {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to flush build log");
            }
        }
    }
}
