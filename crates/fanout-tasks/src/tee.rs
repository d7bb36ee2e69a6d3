//! Output multiplexing: one write interface over two byte sinks

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Duplicates every write to a console sink and a log sink.
///
/// Each sink sits behind its own lock so concurrent writers relaying
/// the same task's stdout and stderr never interleave partial writes
/// into either destination. The tee never closes its sinks; their
/// lifetime belongs to the caller.
#[derive(Debug)]
pub struct OutputTee<C, L> {
    console: Mutex<C>,
    log: Mutex<L>,
}

impl<C, L> OutputTee<C, L>
where
    C: AsyncWrite + Unpin + Send,
    L: AsyncWrite + Unpin + Send,
{
    /// Wrap a console sink and a log sink
    pub fn new(console: C, log: L) -> Self {
        Self {
            console: Mutex::new(console),
            log: Mutex::new(log),
        }
    }

    /// Forward a buffer to both sinks, byte-identically
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.console.lock().await.write_all(buf).await?;
        self.log.lock().await.write_all(buf).await?;
        Ok(())
    }

    /// Write a line to the log sink only (capture headers and footers)
    pub async fn log_line(&self, line: &str) -> io::Result<()> {
        let mut log = self.log.lock().await;
        log.write_all(line.as_bytes()).await?;
        log.write_all(b"\n").await
    }

    /// Flush both sinks
    pub async fn flush(&self) -> io::Result<()> {
        self.console.lock().await.flush().await?;
        self.log.lock().await.flush().await
    }

    /// Take both sinks back out of the tee
    pub fn into_inner(self) -> (C, L) {
        (self.console.into_inner(), self.log.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bytes_reach_both_sinks() {
        let tee = OutputTee::new(Vec::new(), Vec::new());
        tee.write_all(b"hello ").await.unwrap();
        tee.write_all(b"world").await.unwrap();
        tee.flush().await.unwrap();

        let (console, log) = tee.into_inner();
        assert_eq!(console, b"hello world");
        assert_eq!(log, b"hello world");
    }

    #[tokio::test]
    async fn test_zero_length_write() {
        let tee = OutputTee::new(Vec::new(), Vec::new());
        tee.write_all(b"").await.unwrap();

        let (console, log) = tee.into_inner();
        assert!(console.is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_multi_chunk_writes_are_byte_identical() {
        let tee = OutputTee::new(Vec::new(), Vec::new());
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        for chunk in payload.chunks(97) {
            tee.write_all(chunk).await.unwrap();
        }

        let (console, log) = tee.into_inner();
        assert_eq!(console, payload);
        assert_eq!(console, log);
    }

    #[tokio::test]
    async fn test_log_line_skips_console() {
        let tee = OutputTee::new(Vec::new(), Vec::new());
        tee.log_line("[header]").await.unwrap();
        tee.write_all(b"body").await.unwrap();

        let (console, log) = tee.into_inner();
        assert_eq!(console, b"body");
        assert_eq!(log, b"[header]\nbody");
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_interleave_within_a_write() {
        use std::sync::Arc;

        let tee = Arc::new(OutputTee::new(Vec::new(), Vec::new()));
        let mut handles = Vec::new();
        for byte in [b'x', b'y'] {
            let tee = Arc::clone(&tee);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    tee.write_all(&[byte; 8]).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let tee = Arc::try_unwrap(tee).unwrap();
        let (console, log) = tee.into_inner();
        assert_eq!(console.len(), 800);
        assert_eq!(log.len(), 800);
        // Every 8-byte write landed whole in both sinks
        for sink in [&console, &log] {
            for chunk in sink.chunks(8) {
                assert!(chunk.iter().all(|b| *b == chunk[0]));
            }
        }
    }
}
