//! Length-prefixed framing over a byte stream
//!
//! Every Kafka wire message is one frame: a 4-byte big-endian unsigned length
//! followed by exactly that many payload bytes. The length prefix is not part
//! of the payload. A length of zero is a valid empty frame. No maximum frame
//! length is enforced at this layer; upper layers supply bounds.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

/// Frame a payload: 4-byte big-endian length prefix, then the payload,
/// as one contiguous buffer.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    write_frame(&mut buf, payload);
    buf.freeze()
}

/// Append one frame to `buf`
pub fn write_frame(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
}

/// Read one complete frame from the stream.
///
/// Returns `Ok(None)` on a clean end of stream (no bytes of a next frame
/// read). A stream that ends mid-frame fails with `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<BytesMut>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside frame length prefix",
            )
            .into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = BytesMut::zeroed(len);
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside frame payload",
                )
            } else {
                e
            }
        })?;
    }
    Ok(Some(payload))
}
