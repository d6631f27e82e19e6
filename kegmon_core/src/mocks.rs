//! Test and helper mocks for kegmon_core

use std::collections::VecDeque;

/// A load cell that always errors on read; useful when exercising fault paths
/// or building a pipeline that is only used for commands.
pub struct NoopLoadCell;

impl kegmon_traits::LoadCell for NoopLoadCell {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop load cell")))
    }
}

/// Replays a fixed script of reads. `None` entries fail with a timeout; once the
/// script runs out the last successful value is repeated.
pub struct ScriptedLoadCell {
    script: VecDeque<Option<i32>>,
    last: Option<i32>,
}

impl ScriptedLoadCell {
    pub fn new(script: impl IntoIterator<Item = Option<i32>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: None,
        }
    }

    /// Script with every read succeeding.
    pub fn values(values: impl IntoIterator<Item = i32>) -> Self {
        Self::new(values.into_iter().map(Some))
    }
}

impl kegmon_traits::LoadCell for ScriptedLoadCell {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let next = match self.script.pop_front() {
            Some(step) => step,
            None => self.last,
        };
        match next {
            Some(v) => {
                self.last = Some(v);
                Ok(v)
            }
            None => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "scripted timeout",
            ))),
        }
    }
}
