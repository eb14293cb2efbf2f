//! Redirect sinks and sources for [`crate::command::IoCommand`].
//!
//! The sink/source kinds a redirect can target are: file path,
//! byte stream, text writer, text reader, line collection, character
//! collection. Each copy function here returns a [`CopyOutcome`] rather than
//! treating an early-closed destination as an expected
//! pipe exception" re-architecture.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::drainer::PipeLineReader;
use crate::error::{CommandError, CopyOutcome};
use crate::pipe::Pipe;

/// Where a command's stdout/stderr can be redirected to.
pub enum RedirectSink {
    File(PathBuf),
    /// Raw bytes, collected in arrival order.
    Bytes(Arc<Mutex<Vec<u8>>>),
    /// One entry per line (trailing newline stripped).
    Lines(Arc<Mutex<Vec<String>>>),
    /// One entry per `char`, in arrival order (UTF-8 decoded).
    Chars(Arc<Mutex<Vec<char>>>),
    /// An arbitrary async text/byte writer.
    Writer(Box<dyn AsyncWrite + Unpin + Send>),
}

/// Where a command's stdin can be fed from.
pub enum RedirectSource {
    File(PathBuf),
    Bytes(Vec<u8>),
    Lines(Vec<String>),
    Chars(Vec<char>),
    Reader(Box<dyn AsyncRead + Unpin + Send>),
}

fn is_broken_pipe(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::BrokenPipe)
}

/// Drain `pipe` to EOF, delivering every byte to `sink`. Returns
/// [`CopyOutcome::DownstreamClosed`] if `sink` stops accepting data early
/// (broken pipe) rather than treating that as an error.
pub async fn copy_to_sink(pipe: Arc<Pipe>, sink: RedirectSink) -> Result<CopyOutcome, CommandError> {
    match sink {
        RedirectSink::File(path) => {
            let mut file = tokio::fs::File::create(&path).await?;
            copy_pipe_into_writer(pipe, &mut file).await
        }
        RedirectSink::Writer(mut writer) => copy_pipe_into_writer(pipe, writer.as_mut()).await,
        RedirectSink::Bytes(sink) => {
            let cancel = tokio_util::sync::CancellationToken::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = pipe
                    .read(&mut buf, None, &cancel)
                    .await
                    .map_err(|_| CommandError::Io(std::io::Error::other("pipe read failed")))?;
                if n == 0 {
                    return Ok(CopyOutcome::Completed);
                }
                sink.lock().unwrap().extend_from_slice(&buf[..n]);
            }
        }
        RedirectSink::Lines(sink) => {
            let mut reader = PipeLineReader::new(pipe);
            loop {
                match reader.read_line().await? {
                    Some(line) => sink.lock().unwrap().push(line),
                    None => return Ok(CopyOutcome::Completed),
                }
            }
        }
        RedirectSink::Chars(sink) => {
            let cancel = tokio_util::sync::CancellationToken::new();
            let mut buf = [0u8; 4096];
            let mut carry: Vec<u8> = Vec::new();
            loop {
                let n = pipe
                    .read(&mut buf, None, &cancel)
                    .await
                    .map_err(|_| CommandError::Io(std::io::Error::other("pipe read failed")))?;
                if n == 0 {
                    if !carry.is_empty() {
                        for c in String::from_utf8_lossy(&carry).chars() {
                            sink.lock().unwrap().push(c);
                        }
                    }
                    return Ok(CopyOutcome::Completed);
                }
                carry.extend_from_slice(&buf[..n]);
                // Only drain whole, valid UTF-8 prefixes; keep any trailing
                // partial multi-byte sequence in `carry` for the next chunk.
                let valid_len = match std::str::from_utf8(&carry) {
                    Ok(s) => s.len(),
                    Err(e) => e.valid_up_to(),
                };
                let text = String::from_utf8_lossy(&carry[..valid_len]).into_owned();
                for c in text.chars() {
                    sink.lock().unwrap().push(c);
                }
                carry.drain(..valid_len);
            }
        }
    }
}

async fn copy_pipe_into_writer(
    pipe: Arc<Pipe>,
    writer: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<CopyOutcome, CommandError> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = pipe
            .read(&mut buf, None, &cancel)
            .await
            .map_err(|_| CommandError::Io(std::io::Error::other("pipe read failed")))?;
        if n == 0 {
            let _ = writer.flush().await;
            return Ok(CopyOutcome::Completed);
        }
        match writer.write_all(&buf[..n]).await {
            Ok(()) => {}
            Err(e) if is_broken_pipe(&e) => return Ok(CopyOutcome::DownstreamClosed),
            Err(e) => return Err(CommandError::Io(e)),
        }
    }
}

/// Copy `pipe` to EOF directly into a child's stdin — the aux task behind
/// [`crate::command::PipedCommand`]. Closes `stdin` once the source is
/// exhausted so the downstream process observes EOF on its own stdin.
pub async fn copy_pipe_to_stdin(
    pipe: Arc<Pipe>,
    stdin: &mut crate::compat_stream::CompatStdin,
) -> Result<CopyOutcome, CommandError> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = pipe
            .read(&mut buf, None, &cancel)
            .await
            .map_err(|_| CommandError::Io(std::io::Error::other("pipe read failed")))?;
        if n == 0 {
            stdin.shutdown().await?;
            return Ok(CopyOutcome::Completed);
        }
        write_all_checked(stdin, &buf[..n]).await?;
    }
}

/// Feed `source` into `stdin` until the source is exhausted or `stdin`
/// reports the child has stopped reading (broken pipe, which is not an
/// error — the child may simply not need all of its input, see scenario 4
/// ).
pub async fn feed_source(
    source: RedirectSource,
    stdin: &mut crate::compat_stream::CompatStdin,
) -> Result<CopyOutcome, CommandError> {
    match source {
        RedirectSource::Bytes(data) => write_all_checked(stdin, &data).await,
        RedirectSource::Lines(lines) => {
            for line in lines {
                let mut buf = line.into_bytes();
                buf.push(b'\n');
                match write_all_checked(stdin, &buf).await? {
                    CopyOutcome::Completed => {}
                    closed @ CopyOutcome::DownstreamClosed => return Ok(closed),
                }
            }
            Ok(CopyOutcome::Completed)
        }
        RedirectSource::Chars(chars) => {
            let text: String = chars.into_iter().collect();
            write_all_checked(stdin, text.as_bytes()).await
        }
        RedirectSource::File(path) => {
            let mut file = tokio::fs::File::open(&path).await?;
            let mut buf = [0u8; 4096];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(CopyOutcome::Completed);
                }
                match write_all_checked(stdin, &buf[..n]).await? {
                    CopyOutcome::Completed => {}
                    closed @ CopyOutcome::DownstreamClosed => return Ok(closed),
                }
            }
        }
        RedirectSource::Reader(mut reader) => {
            let mut buf = [0u8; 4096];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(CopyOutcome::Completed);
                }
                match write_all_checked(stdin, &buf[..n]).await? {
                    CopyOutcome::Completed => {}
                    closed @ CopyOutcome::DownstreamClosed => return Ok(closed),
                }
            }
        }
    }
}

async fn write_all_checked(
    stdin: &mut crate::compat_stream::CompatStdin,
    data: &[u8],
) -> Result<CopyOutcome, CommandError> {
    // CompatStdin::write_all already turns a post-exit broken pipe into
    // Ok(()); we treat that success uniformly as Completed since, from this
    // copy loop's perspective, it could not distinguish "fully accepted" from
    // "child stopped reading and we silently discarded the rest" — both are
    // non-error outcomes: a recoverable broken-pipe case, and a producer
    // being only partially consumed by a downstream that stops reading early.
    stdin.write_all(data).await?;
    Ok(CopyOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn bytes_sink_collects_everything_written() {
        let pipe = Arc::new(Pipe::new());
        pipe.write(b"hello world", None, &CancellationToken::new())
            .await
            .unwrap();
        pipe.close_write();
        let sink = Arc::new(Mutex::new(Vec::new()));
        let outcome = copy_to_sink(pipe, RedirectSink::Bytes(sink.clone())).await.unwrap();
        assert_eq!(outcome, CopyOutcome::Completed);
        assert_eq!(&*sink.lock().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn lines_sink_splits_on_newlines() {
        let pipe = Arc::new(Pipe::new());
        pipe.write(b"1\n2\n3\n", None, &CancellationToken::new())
            .await
            .unwrap();
        pipe.close_write();
        let sink = Arc::new(Mutex::new(Vec::new()));
        copy_to_sink(pipe, RedirectSink::Lines(sink.clone())).await.unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["1", "2", "3"]);
    }
}
