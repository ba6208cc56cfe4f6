//! Length-prefixed message transport.
//!
//! Each message on the wire is a 4-byte big-endian length followed by that
//! many payload bytes. A frame larger than `max_message_size`, a filter
//! rejection or an I/O error closes the transport.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::transport::{TransportError, TransportFactory, TransportFuture, TransportSetup};

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one length-prefixed frame, `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_len}"),
        ));
    }
    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Default factory: one framed request/reply loop per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedTransportFactory;

impl TransportFactory for FramedTransportFactory {
    fn create_transport(&self, setup: TransportSetup) -> Result<TransportFuture, TransportError> {
        Ok(Box::pin(run(setup)))
    }
}

async fn run(setup: TransportSetup) {
    let TransportSetup {
        id,
        endpoint,
        args,
        filters,
        dispatcher,
    } = setup;
    let (mut reader, mut writer) = tokio::io::split(endpoint);

    loop {
        let message = match read_frame(&mut reader, args.max_message_size).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(transport_id = %id, error = %e, "Transport read failed");
                break;
            }
        };

        let message = match filters.process_inbound(message) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(transport_id = %id, error = %e, "Message rejected by filter");
                break;
            }
        };

        let Some(reply) = dispatcher.dispatch(id, message).await else {
            continue;
        };

        let reply = match filters.process_outbound(reply) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(transport_id = %id, error = %e, "Reply rejected by filter");
                break;
            }
        };

        if let Err(e) = write_frame(&mut writer, &reply).await {
            tracing::debug!(transport_id = %id, error = %e, "Transport write failed");
            break;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!(transport_id = %id, "Transport finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_survive_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"hello").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server, 16).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut server, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, b"too long").await.unwrap();

        let err = read_frame(&mut server, 4).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
