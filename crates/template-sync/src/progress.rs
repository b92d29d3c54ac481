/// Receives free-text progress lines from a sync run, one per inspected
/// directory, copied file, and deleted item. Callers decide how to present
/// them (the CLI forwards to its log stream, tests capture them).
pub trait Progress: Send + Sync {
    fn log(&self, line: &str);
}

/// Discards all progress lines.
pub struct NoProgress;

impl Progress for NoProgress {
    fn log(&self, _line: &str) {}
}

impl<F> Progress for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line)
    }
}
