//! [`MergedLineStream`]: combines two line readers (typically a command's
//! stdout and stderr drainers) into one lazy, single-pass line sequence that
//! preserves per-source line atomicity.
//!
//! Built as a [`futures::stream::Stream`] via `futures::stream::unfold`, the
//! same construction used to turn a `recv().await` race into a `Stream`.

use std::future::Future;
use std::pin::Pin;

use futures::stream::{self, Stream};

use crate::drainer::PipeLineReader;

/// Which side a merged line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    First,
    Second,
}

type ReadOneOutput = (std::io::Result<Option<String>>, PipeLineReader);
type ReadOneFuture = Pin<Box<dyn Future<Output = ReadOneOutput>>>;

enum Side {
    Open(ReadOneFuture),
    Eof,
}

struct MergeState {
    first: Side,
    second: Side,
}

fn read_one(mut r: PipeLineReader) -> ReadOneFuture {
    Box::pin(async move {
        let result = r.read_line().await;
        (result, r)
    })
}

/// Start merging `first` and `second`. Returns a stream of
/// `(LineSource, String)`. Each side's lines appear in that side's original
/// order; no ordering guarantee is made between sides beyond arrival order.
///
/// The two readers are consumed by this call — enumeration starts
/// exactly once.
pub fn merge(
    first: PipeLineReader,
    second: PipeLineReader,
) -> impl Stream<Item = std::io::Result<(LineSource, String)>> {
    let state = MergeState {
        first: Side::Open(read_one(first)),
        second: Side::Open(read_one(second)),
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match (&mut state.first, &mut state.second) {
                (Side::Eof, Side::Eof) => return None,
                (Side::Open(fut), Side::Eof) => {
                    let (result, reader) = fut.as_mut().await;
                    match result {
                        Ok(Some(line)) => {
                            state.first = Side::Open(read_one(reader));
                            return Some((Ok((LineSource::First, line)), Some(state)));
                        }
                        Ok(None) => {
                            state.first = Side::Eof;
                            continue;
                        }
                        Err(e) => return Some((Err(e), None)),
                    }
                }
                (Side::Eof, Side::Open(fut)) => {
                    let (result, reader) = fut.as_mut().await;
                    match result {
                        Ok(Some(line)) => {
                            state.second = Side::Open(read_one(reader));
                            return Some((Ok((LineSource::Second, line)), Some(state)));
                        }
                        Ok(None) => {
                            state.second = Side::Eof;
                            continue;
                        }
                        Err(e) => return Some((Err(e), None)),
                    }
                }
                (Side::Open(f1), Side::Open(f2)) => {
                    tokio::select! {
                        (result, reader) = f1.as_mut() => {
                            match result {
                                Ok(Some(line)) => {
                                    state.first = Side::Open(read_one(reader));
                                    return Some((Ok((LineSource::First, line)), Some(state)));
                                }
                                Ok(None) => {
                                    state.first = Side::Eof;
                                    continue;
                                }
                                Err(e) => return Some((Err(e), None)),
                            }
                        }
                        (result, reader) = f2.as_mut() => {
                            match result {
                                Ok(Some(line)) => {
                                    state.second = Side::Open(read_one(reader));
                                    return Some((Ok((LineSource::Second, line)), Some(state)));
                                }
                                Ok(None) => {
                                    state.second = Side::Eof;
                                    continue;
                                }
                                Err(e) => return Some((Err(e), None)),
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn reader_with(lines: &[&str]) -> PipeLineReader {
        let pipe = Arc::new(Pipe::new());
        let data = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
        pipe.write(data.as_bytes(), None, &CancellationToken::new())
            .await
            .unwrap();
        pipe.close_write();
        PipeLineReader::new(pipe)
    }

    #[tokio::test]
    async fn preserves_per_source_order() {
        let r1 = reader_with(&["a1", "a2", "a3"]).await;
        let r2 = reader_with(&["b1", "b2"]).await;
        let merged: Vec<_> = merge(r1, r2)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let firsts: Vec<_> = merged
            .iter()
            .filter(|(s, _)| *s == LineSource::First)
            .map(|(_, l)| l.clone())
            .collect();
        let seconds: Vec<_> = merged
            .iter()
            .filter(|(s, _)| *s == LineSource::Second)
            .map(|(_, l)| l.clone())
            .collect();
        assert_eq!(firsts, vec!["a1", "a2", "a3"]);
        assert_eq!(seconds, vec!["b1", "b2"]);
        assert_eq!(merged.len(), 5);
    }

    #[tokio::test]
    async fn one_side_empty_drains_other_fully() {
        let r1 = reader_with(&[]).await;
        let r2 = reader_with(&["only1", "only2"]).await;
        let merged: Vec<_> = merge(r1, r2).map(|r| r.unwrap().1).collect().await;
        assert_eq!(merged, vec!["only1", "only2"]);
    }
}
