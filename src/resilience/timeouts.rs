//! Timeout enforcement for streamed upstream bodies.
//!
//! # Responsibilities
//! - Bound the wait for each chunk of a streamed body
//! - End the stream with a `TimedOut` error instead of hanging
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Dropping the returned stream drops the upstream body, which closes the
//!   upstream connection

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

/// Wrap `stream` so that a gap longer than `idle` between chunks ends it with
/// an `io::ErrorKind::TimedOut` error.
pub fn idle_timeout_stream<S, E>(
    stream: S,
    idle: Duration,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    futures_util::stream::unfold(Some(Box::pin(stream)), move |state| async move {
        let mut stream = state?;
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(stream))),
            Ok(Some(Err(e))) => Some((Err(io::Error::other(e)), None)),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(idle_secs = idle.as_secs(), "Upstream body stalled, closing stream");
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "upstream body stalled")),
                    None,
                ))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_times_out() {
        let source = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"first"))])
            .chain(stream::pending());
        let items: Vec<_> = idle_timeout_stream(source, Duration::from_secs(5))
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b"first"));
        assert_eq!(items[1].as_ref().unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_complete_stream_passes_through() {
        let source = stream::iter(vec![
            Ok::<_, io::Error>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]);
        let chunks: Vec<Bytes> = idle_timeout_stream(source, Duration::from_secs(5))
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let source = stream::iter(vec![
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"never")),
        ]);
        let items: Vec<_> = idle_timeout_stream(source, Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
