//! Payload stream type and forwarding of response bodies.

use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The type of [`Stream`](futures_util::Stream) produced by content reads.
pub type PayloadStream = BoxStream<'static, io::Result<Bytes>>;

/// Number of chunks that may be read ahead of the consumer.
const FORWARD_CAPACITY: usize = 1;

/// Forwards the body of `response` into a [`PayloadStream`].
///
/// A background task pulls chunks from the response and sends them through a bounded channel. The
/// task only reads ahead by [`FORWARD_CAPACITY`] chunks, so the consumer controls the pace. The
/// stream ends after the last chunk or after the first error. Dropping the stream stops the task at
/// its next send.
pub(crate) fn forward(response: reqwest::Response) -> PayloadStream {
    let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);

    tokio::spawn(async move {
        let mut body = response.bytes_stream().map_err(io::Error::other);
        while let Some(chunk) = body.next().await {
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() {
                tracing::trace!("payload stream dropped before completion");
                break;
            }
            if failed {
                break;
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}

/// Creates a [`PayloadStream`] that yields no data.
pub(crate) fn empty() -> PayloadStream {
    futures_util::stream::empty().boxed()
}
