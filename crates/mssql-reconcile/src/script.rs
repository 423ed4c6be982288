//! Thread-safe accumulation of per-table change-script fragments.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Batch separator placed after every fragment.
pub const BATCH_SEPARATOR: &str = "GO";

/// Line ending used in the generated script (tablediff emits CRLF).
pub const LINE_ENDING: &str = "\r\n";

/// Shared accumulator for the aggregate change script.
///
/// Appends are serialized; fragments from different tables land in
/// completion order. The progress counter carries no ordering guarantee.
#[derive(Debug)]
pub struct ScriptAccumulator {
    buffer: Mutex<String>,
    completed: AtomicUsize,
    total: usize,
}

impl ScriptAccumulator {
    /// Create an accumulator expecting `total` diff tasks.
    pub fn new(total: usize) -> Self {
        Self {
            buffer: Mutex::new(String::new()),
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Append a fragment followed by the batch separator and a blank line.
    ///
    /// Empty or whitespace-only fragments are ignored.
    pub fn append(&self, fragment: &str) {
        if fragment.trim().is_empty() {
            return;
        }

        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(fragment);
        if !fragment.ends_with('\n') {
            buffer.push_str(LINE_ENDING);
        }
        buffer.push_str(BATCH_SEPARATOR);
        buffer.push_str(LINE_ENDING);
        buffer.push_str(LINE_ENDING);
    }

    /// Record one finished diff task and log progress. Returns the new count.
    pub fn increment_and_report(&self) -> usize {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Finished {} of {}", done, self.total);
        done
    }

    /// Number of diff tasks recorded so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Copy of the current script.
    pub fn snapshot(&self) -> String {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Consume the accumulator and return the finished script.
    pub fn into_script(self) -> String {
        self.buffer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_blank_fragments_are_ignored() {
        let acc = ScriptAccumulator::new(3);
        acc.append("");
        acc.append("   ");
        acc.append("\r\n\t\n");
        assert_eq!(acc.snapshot(), "");
    }

    #[test]
    fn test_blank_append_leaves_existing_script_unchanged() {
        let acc = ScriptAccumulator::new(2);
        acc.append("DELETE FROM [dbo].[A] WHERE [Id]=1\r\n");
        let before = acc.snapshot();
        acc.append(" \r\n");
        assert_eq!(acc.snapshot(), before);
    }

    #[test]
    fn test_fragment_followed_by_separator_and_blank_line() {
        let acc = ScriptAccumulator::new(1);
        acc.append("UPDATE [dbo].[A] SET [X]=1 WHERE [Id]=1\r\n");
        assert_eq!(
            acc.into_script(),
            "UPDATE [dbo].[A] SET [X]=1 WHERE [Id]=1\r\nGO\r\n\r\n"
        );
    }

    #[test]
    fn test_separator_on_own_line_without_trailing_newline() {
        let acc = ScriptAccumulator::new(1);
        acc.append("SELECT 1");
        assert_eq!(acc.into_script(), "SELECT 1\r\nGO\r\n\r\n");
    }

    #[test]
    fn test_increment_and_report() {
        let acc = ScriptAccumulator::new(2);
        assert_eq!(acc.increment_and_report(), 1);
        assert_eq!(acc.increment_and_report(), 2);
        assert_eq!(acc.completed(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_interleaved() {
        let n = 64;
        let acc = Arc::new(ScriptAccumulator::new(n));

        let mut handles = Vec::new();
        for i in 0..n {
            let acc = acc.clone();
            handles.push(tokio::spawn(async move {
                let body = format!("-- fragment {i}\r\n{}\r\n", "X".repeat(500 + i));
                acc.append(&body);
                acc.increment_and_report();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(acc.completed(), n);
        let script = Arc::try_unwrap(acc).unwrap().into_script();

        let blocks: Vec<&str> = script
            .split("GO\r\n\r\n")
            .filter(|b| !b.is_empty())
            .collect();
        assert_eq!(blocks.len(), n);

        let mut seen: Vec<usize> = blocks
            .iter()
            .map(|block| {
                let mut lines = block.lines();
                let header = lines.next().unwrap();
                let i: usize = header.trim_start_matches("-- fragment ").parse().unwrap();
                assert_eq!(lines.next().unwrap(), "X".repeat(500 + i));
                assert_eq!(lines.next(), None);
                i
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }
}
