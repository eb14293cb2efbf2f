//! In-memory bounded byte [`Pipe`].
//!
//! A single-producer/single-consumer FIFO byte channel used to decouple a
//! child process's OS stream from whatever is consuming it. Growth, signals,
//! and close semantics: at most one pending read
//! and one pending write at a time, a binary "bytes available" signal and an
//! optional binary "space available" signal (fixed-length mode only), both
//! recomputed in a single `update_signals` step after every state change so a
//! second writer can never race ahead of a waking reader.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::PipeError;

/// Default chunk size used to size the initial buffer and as the fixed-length
/// backpressure unit.
pub const BYTE_BUFFER_SIZE: usize = 4096;

/// Upper bound on the buffer in fixed-length mode: `2 * BYTE_BUFFER_SIZE`.
pub const MAX_STABLE_SIZE: usize = 2 * BYTE_BUFFER_SIZE;

const MIN_INITIAL_CAPACITY: usize = 256;

struct State {
    buf: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
    fixed_length: bool,
    read_pending: bool,
    write_pending: bool,
}

impl State {
    fn space_available(&self) -> usize {
        MAX_STABLE_SIZE.saturating_sub(self.buf.len())
    }

    /// Grow capacity so at least `required` additional bytes fit, doubling
    /// from the current capacity with a 256-byte floor. Never exceeds
    /// `MAX_STABLE_SIZE` in fixed-length mode — a caller that would violate
    /// that bound made a programming error (checked by the fixed-length
    /// write path before this is reached).
    fn reserve_for(&mut self, additional: usize) {
        let required = self.buf.len() + additional;
        if required <= self.buf.capacity() {
            return;
        }
        let mut new_cap = (self.buf.capacity() * 2).max(MIN_INITIAL_CAPACITY).max(required);
        if self.fixed_length {
            new_cap = new_cap.min(MAX_STABLE_SIZE);
        }
        self.buf.reserve(new_cap - self.buf.len());
    }

    /// After a read empties the buffer down from above `MAX_STABLE_SIZE`,
    /// shrink the backing allocation back down.
    fn shrink_if_oversized(&mut self) {
        if self.buf.capacity() > MAX_STABLE_SIZE && self.buf.len() <= MAX_STABLE_SIZE {
            self.buf.shrink_to(MAX_STABLE_SIZE);
        }
    }
}

/// Bounded in-memory byte pipe. See module docs.
pub struct Pipe {
    state: Mutex<State>,
    bytes_available: Notify,
    space_available: Notify,
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe {
    /// Create a new pipe with both sides open and an empty buffer.
    pub fn new() -> Self {
        Pipe {
            state: Mutex::new(State {
                buf: VecDeque::with_capacity(MIN_INITIAL_CAPACITY),
                writer_closed: false,
                reader_closed: false,
                fixed_length: false,
                read_pending: false,
                write_pending: false,
            }),
            bytes_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    /// Install fixed-length (backpressured) mode. No-op if already installed
    /// or if either side is closed.
    pub fn set_fixed_length(&self) {
        let mut st = self.state.lock().unwrap();
        if st.fixed_length || st.writer_closed || st.reader_closed {
            return;
        }
        st.fixed_length = true;
        st.buf.shrink_to(MAX_STABLE_SIZE);
        drop(st);
        self.update_signals();
    }

    /// Recompute both signals from current state. Called at the tail of every
    /// state-changing operation so a waiter that wakes always observes a
    /// state consistent with the signal that woke it.
    fn update_signals(&self) {
        let st = self.state.lock().unwrap();
        let bytes_ready = !st.buf.is_empty() || st.writer_closed;
        let space_ready = !st.fixed_length || st.reader_closed || st.space_available() > 0;
        drop(st);
        if bytes_ready {
            self.bytes_available.notify_one();
        }
        if space_ready {
            self.space_available.notify_one();
        }
    }

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` only once the writer has
    /// closed and the buffer is empty (EOF). A zero-length `buf` returns
    /// `Ok(0)` immediately without touching pipe state.
    pub async fn read(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if cancel.is_cancelled() {
            return Err(PipeError::Cancelled);
        }
        {
            let mut st = self.state.lock().unwrap();
            if st.read_pending {
                return Err(PipeError::ConcurrentAccess);
            }
            st.read_pending = true;
        }
        let result = self.read_inner(buf, timeout, cancel).await;
        self.state.lock().unwrap().read_pending = false;
        result
    }

    async fn read_inner(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<usize, PipeError> {
        loop {
            {
                let mut st = self.state.lock().unwrap();
                if !st.buf.is_empty() || st.writer_closed {
                    let n = st.buf.len().min(buf.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = st.buf.pop_front().unwrap();
                    }
                    st.shrink_if_oversized();
                    drop(st);
                    self.update_signals();
                    return Ok(n);
                }
            }
            wait_for(&self.bytes_available, timeout, Some(cancel)).await?;
        }
    }

    /// Write all of `data`. If the reader has closed, the bytes are
    /// logically discarded and this returns immediately as success. In
    /// fixed-length mode the write may block for space; `timeout`/`cancel`
    /// only gate the wait for the *first* chunk to fit, so a write either
    /// completes entirely or fails entirely (all-or-nothing).
    pub async fn write(
        &self,
        data: &[u8],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), PipeError> {
        if data.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PipeError::Cancelled);
        }
        {
            let mut st = self.state.lock().unwrap();
            if st.write_pending {
                return Err(PipeError::ConcurrentAccess);
            }
            st.write_pending = true;
        }
        let result = self.write_inner(data, timeout, cancel).await;
        self.state.lock().unwrap().write_pending = false;
        result
    }

    async fn write_inner(
        &self,
        data: &[u8],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), PipeError> {
        // Only the first *wait* (whichever chunk triggers it) is timeout- and
        // cancellation-gated. Once a write has made the caller wait once, all
        // further waits for this call block on space alone, ignoring both
        // `timeout` and `cancel` — this is what makes the write all-or-nothing
        // rather than aborting with earlier bytes already committed and
        // readable.
        let mut waited_once = false;
        let mut offset = 0;
        while offset < data.len() {
            loop {
                {
                    let mut st = self.state.lock().unwrap();
                    if st.reader_closed {
                        // Bytes are discarded — logically written, never observed.
                        return Ok(());
                    }
                    let space = if st.fixed_length {
                        st.space_available()
                    } else {
                        data.len() - offset
                    };
                    if space > 0 {
                        let take = space.min(data.len() - offset);
                        st.reserve_for(take);
                        st.buf.extend(&data[offset..offset + take]);
                        offset += take;
                        drop(st);
                        self.update_signals();
                        break;
                    }
                }
                let chunk_timeout = if waited_once { None } else { timeout };
                let chunk_cancel = if waited_once { None } else { Some(cancel) };
                wait_for(&self.space_available, chunk_timeout, chunk_cancel).await?;
                waited_once = true;
            }
        }
        Ok(())
    }

    /// Close the write side. Idempotent; if a write is currently in flight the
    /// close is recorded and takes effect once that write completes (the
    /// in-flight write still observes the old state during its own steps).
    pub fn close_write(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.writer_closed = true;
        }
        self.update_signals();
    }

    /// Close the read side. Idempotent. Once closed, further writes succeed
    /// but discard their bytes.
    pub fn close_read(&self) {
        {
            let mut st = self.state.lock().unwrap();
            st.reader_closed = true;
            st.buf.clear();
        }
        self.update_signals();
    }

    pub fn is_writer_closed(&self) -> bool {
        self.state.lock().unwrap().writer_closed
    }

    pub fn is_reader_closed(&self) -> bool {
        self.state.lock().unwrap().reader_closed
    }

    /// Bytes currently buffered (for diagnostics/tests).
    pub fn buffered_len(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }
}

/// Wait for `signal`, honoring an optional timeout and an optional
/// cancellation token. `cancel: None` means this wait is past the
/// all-or-nothing boundary of a write already underway and must run to
/// completion on space alone, ignoring both timeout and cancellation.
/// Fails fast if `cancel` is present and already signaled.
async fn wait_for(
    signal: &Notify,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<(), PipeError> {
    if let Some(cancel) = cancel {
        if cancel.is_cancelled() {
            return Err(PipeError::Cancelled);
        }
    }
    match (timeout, cancel) {
        (Some(d), Some(cancel)) => tokio::select! {
            () = signal.notified() => Ok(()),
            () = cancel.cancelled() => Err(PipeError::Cancelled),
            () = tokio::time::sleep(d) => Err(PipeError::Timeout),
        },
        (Some(d), None) => tokio::select! {
            () = signal.notified() => Ok(()),
            () = tokio::time::sleep(d) => Err(PipeError::Timeout),
        },
        (None, Some(cancel)) => tokio::select! {
            () = signal.notified() => Ok(()),
            () = cancel.cancelled() => Err(PipeError::Cancelled),
        },
        (None, None) => {
            signal.notified().await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn zero_length_read_write_are_noops() {
        let pipe = Pipe::new();
        let mut buf = [0u8; 0];
        assert_eq!(pipe.read(&mut buf, None, &no_cancel()).await.unwrap(), 0);
        assert_eq!(pipe.buffered_len(), 0);
        pipe.write(&[], None, &no_cancel()).await.unwrap();
        assert_eq!(pipe.buffered_len(), 0);
    }

    #[tokio::test]
    async fn read_after_writer_close_with_empty_buffer_is_eof() {
        let pipe = Pipe::new();
        pipe.close_write();
        let mut buf = [0u8; 16];
        assert_eq!(pipe.read(&mut buf, None, &no_cancel()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_after_reader_close_discards_silently() {
        let pipe = Pipe::new();
        pipe.close_read();
        pipe.write(b"hello", None, &no_cancel()).await.unwrap();
        assert_eq!(pipe.buffered_len(), 0);
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let pipe = Pipe::new();
        pipe.write(b"hello world", None, &no_cancel()).await.unwrap();
        let mut buf = [0u8; 32];
        let n = pipe.read(&mut buf, None, &no_cancel()).await.unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[tokio::test]
    async fn fixed_length_never_exceeds_max_stable_size() {
        let pipe = Pipe::new();
        pipe.set_fixed_length();
        let chunk = vec![7u8; MAX_STABLE_SIZE];
        let pipe = std::sync::Arc::new(pipe);
        let writer_pipe = pipe.clone();
        let writer = tokio::spawn(async move {
            writer_pipe
                .write(&chunk, None, &CancellationToken::new())
                .await
                .unwrap();
        });
        // Give the writer a moment to fill the buffer before we drain it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pipe.buffered_len() <= MAX_STABLE_SIZE);
        let mut total = 0;
        let mut buf = [0u8; 512];
        while total < MAX_STABLE_SIZE {
            let n = pipe.read(&mut buf, None, &CancellationToken::new()).await.unwrap();
            total += n;
            assert!(pipe.buffered_len() <= MAX_STABLE_SIZE);
        }
        writer.await.unwrap();
        assert_eq!(total, MAX_STABLE_SIZE);
    }

    #[tokio::test]
    async fn cancel_already_signaled_returns_without_side_effects() {
        let pipe = Pipe::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut buf = [0u8; 8];
        assert!(matches!(
            pipe.read(&mut buf, None, &cancel).await,
            Err(PipeError::Cancelled)
        ));
        assert!(matches!(
            pipe.write(b"x", None, &cancel).await,
            Err(PipeError::Cancelled)
        ));
        assert_eq!(pipe.buffered_len(), 0);
    }

    #[tokio::test]
    async fn read_times_out_while_buffer_empty_and_writer_open() {
        let pipe = Pipe::new();
        let mut buf = [0u8; 8];
        let err = pipe
            .read(&mut buf, Some(Duration::from_millis(20)), &no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, PipeError::Timeout));
    }

    #[tokio::test]
    async fn cancel_after_first_chunk_committed_does_not_abort_the_write() {
        // Fixed-length, two chunks' worth of data: the first chunk fits and
        // commits without waiting, the second must wait for space. Cancel
        // fires only after that first chunk is already in the buffer — the
        // write must still run to completion rather than returning
        // `Cancelled` with only part of `data` committed.
        let pipe = std::sync::Arc::new(Pipe::new());
        pipe.set_fixed_length();
        let first_chunk = vec![1u8; MAX_STABLE_SIZE];
        pipe.write(&first_chunk, None, &no_cancel()).await.unwrap();

        let cancel = CancellationToken::new();
        let second_chunk = vec![2u8; MAX_STABLE_SIZE];
        let writer_pipe = pipe.clone();
        let cancel_for_writer = cancel.clone();
        let writer = tokio::spawn(async move {
            writer_pipe.write(&second_chunk, None, &cancel_for_writer).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        // Drain so the pending write can make progress and complete.
        let mut buf = [0u8; 512];
        let mut drained = 0;
        while drained < MAX_STABLE_SIZE {
            let n = pipe.read(&mut buf, None, &CancellationToken::new()).await.unwrap();
            drained += n;
        }
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn concurrent_reads_are_rejected() {
        let pipe = std::sync::Arc::new(Pipe::new());
        let p2 = pipe.clone();
        let first = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            p2.read(&mut buf, Some(Duration::from_millis(200)), &CancellationToken::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut buf = [0u8; 8];
        let second = pipe.read(&mut buf, None, &no_cancel()).await;
        assert!(matches!(second, Err(PipeError::ConcurrentAccess)));
        first.await.unwrap().unwrap_err();
    }
}
