use std::sync::{Arc, Mutex};

use dagmake::cancel::CancelToken;
use dagmake::exec::Executor;
use dagmake::rule::BoxFuture;

/// A fake executor that:
/// - records every command it is asked to run
/// - succeeds immediately without touching the OS.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }
}

impl Executor for RecordingExecutor {
    fn run_command<'a>(
        &'a self,
        command: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            cancel.check()?;
            self.commands.lock().unwrap().push(command.to_string());
            Ok(())
        })
    }
}
