//! Reassembles logical lines from an arbitrarily chunked byte stream

use futures::stream::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Read buffer size; lines longer than this keep growing the line buffer
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lazily yields complete lines from a reader, in arrival order.
///
/// There is no upper bound on line length: bytes are appended to an
/// internal buffer until a `\n` (or end of stream) is seen, so a line is
/// never split because a read buffer filled up. The trailing `\n`, and a
/// `\r` right before it, are not part of the line.
pub struct LineAssembler<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    lines_read: u64,
}

impl<R: AsyncRead + Unpin> LineAssembler<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(READ_BUFFER_SIZE, reader)
    }

    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            pending: Vec::new(),
            lines_read: 0,
        }
    }

    /// Next logical line, or `Ok(None)` once the stream is exhausted.
    ///
    /// Cancel safe: bytes read by a dropped call stay buffered and are
    /// returned by the next call.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.reader.read_until(b'\n', &mut self.pending).await?;

        if self.pending.is_empty() {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        self.lines_read += 1;
        Ok(Some(into_text(line)))
    }

    /// Number of lines handed out so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Turn the assembler into a stream that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<String>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut assembler = state?;
            match assembler.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(assembler))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Decode a line, replacing invalid UTF-8 instead of failing
fn into_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    async fn collect(mut assembler: LineAssembler<impl AsyncRead + Unpin>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = assembler.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    /// Reference split: what a fully buffered reader would produce
    fn split_lines(input: &str) -> Vec<String> {
        if input.is_empty() {
            return Vec::new();
        }
        let trimmed = input.strip_suffix('\n').unwrap_or(input);
        trimmed.split('\n').map(String::from).collect()
    }

    #[tokio::test]
    async fn test_basic_lines() {
        let assembler = LineAssembler::new(Cursor::new(b"line1\nline2\nline3\n".to_vec()));
        assert_eq!(collect(assembler).await, vec!["line1", "line2", "line3"]);
    }

    #[tokio::test]
    async fn test_final_line_without_separator() {
        let assembler = LineAssembler::new(Cursor::new(b"first\nlast".to_vec()));
        assert_eq!(collect(assembler).await, vec!["first", "last"]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_nothing() {
        let assembler = LineAssembler::new(Cursor::new(Vec::new()));
        assert!(collect(assembler).await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_are_kept() {
        let assembler = LineAssembler::new(Cursor::new(b"a\n\n\nb\n".to_vec()));
        assert_eq!(collect(assembler).await, vec!["a", "", "", "b"]);
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        let assembler = LineAssembler::new(Cursor::new(b"one\r\ntwo\r\n".to_vec()));
        assert_eq!(collect(assembler).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let assembler = LineAssembler::new(Cursor::new(b"ok \xff\n".to_vec()));
        assert_eq!(collect(assembler).await, vec!["ok \u{FFFD}"]);
    }

    #[tokio::test]
    async fn test_chunking_does_not_change_lines() {
        let input = "PLAY [all] ***\n\nTASK [ping] ***\nok: [h1]\nok: [h2] => {\"changed\": false}\nPLAY RECAP";
        let expected = split_lines(input);

        for chunk_size in [1, 2, 3, 5, 7, 16, 64, input.len()] {
            let mut builder = tokio_test::io::Builder::new();
            for chunk in input.as_bytes().chunks(chunk_size) {
                builder.read(chunk);
            }
            // Tiny buffer so reads never line up with line boundaries
            let assembler = LineAssembler::with_capacity(4, builder.build());
            assert_eq!(
                collect(assembler).await,
                expected,
                "chunk size {chunk_size}"
            );
        }
    }

    #[tokio::test]
    async fn test_very_long_line_is_returned_intact() {
        let long_line = "x".repeat(512_000);
        let input = format!("before\n{long_line}\nafter\n");

        let mut builder = tokio_test::io::Builder::new();
        for chunk in input.as_bytes().chunks(4096) {
            builder.read(chunk);
        }
        let lines = collect(LineAssembler::with_capacity(1024, builder.build())).await;

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].len(), 512_000);
        assert_eq!(lines[1], long_line);
        assert_eq!(lines[2], "after");
    }

    #[tokio::test]
    async fn test_read_error_is_propagated() {
        let reader = tokio_test::io::Builder::new()
            .read(b"good\npart")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "pipe closed",
            ))
            .build();
        let mut assembler = LineAssembler::new(reader);

        assert_eq!(assembler.next_line().await.unwrap().as_deref(), Some("good"));
        let err = assembler.next_line().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
        assert_eq!(assembler.lines_read(), 1);
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let assembler = LineAssembler::new(Cursor::new(b"a\nb\n".to_vec()));
        let lines: Vec<String> = assembler
            .into_stream()
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_adapter_stops_after_error() {
        let reader = tokio_test::io::Builder::new()
            .read(b"a\n")
            .read_error(std::io::Error::other("boom"))
            .build();
        let items: Vec<std::io::Result<String>> =
            LineAssembler::new(reader).into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
