use crate::error::Error;
use crate::frame::{Frame, OpCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

/// Hixie-75 and Hybi-00 both frame every message as `0x00 <payload> 0xFF`;
/// there is no length prefix, no mask, and no fragmentation — the whole
/// message arrives as one read up to the terminator byte.
///
/// A leading `0xFF` with no payload is the Hybi-00 "closing handshake"
/// frame and is reported as a Close opcode with an empty payload so the
/// caller's state machine doesn't need a third code path.
pub async fn decode_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_message_size: usize,
) -> Result<Frame, Error> {
    let mut lead = [0u8; 1];
    reader.read_exact(&mut lead).await?;

    if lead[0] == 0xFF {
        return Ok(Frame::new(true, OpCode::Close, Vec::new()));
    }
    if lead[0] != 0x00 {
        return Err(Error::InvalidFrameFragmentation);
    }

    let mut payload = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match timeout(Duration::from_secs(5), reader.read_exact(&mut byte)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(elapsed) => return Err(elapsed.into()),
        }
        if byte[0] == 0xFF {
            break;
        }
        if payload.len() >= max_message_size {
            return Err(Error::MaxMessageSize);
        }
        payload.push(byte[0]);
    }

    Ok(Frame::new(true, OpCode::Text, payload))
}

/// Encodes a text/binary message in the byte-stuffed shape. Hybi-00 has
/// no opcode byte in the wire format; everything is transported as the
/// text frame shape, matching the original's `encodeMessage`, which wraps
/// every outbound payload identically regardless of source opcode.
pub async fn encode_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), Error> {
    if frame.opcode == OpCode::Close {
        writer.write_all(&[0xFF, 0x00]).await?;
        return Ok(());
    }
    writer.write_all(&[0x00]).await?;
    writer.write_all(&frame.payload).await?;
    writer.write_all(&[0xFF]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn decodes_byte_stuffed_text() {
        let bytes: &[u8] = &[0x00, b'h', b'i', 0xFF];
        let mut cursor = Cursor::new(bytes);
        let frame = decode_frame(&mut cursor, 1 << 20).await.unwrap();
        assert_eq!(frame.payload, b"hi");
        assert_eq!(frame.opcode, OpCode::Text);
    }

    #[tokio::test]
    async fn bare_ff_is_close() {
        let bytes: &[u8] = &[0xFF];
        let mut cursor = Cursor::new(bytes);
        let frame = decode_frame(&mut cursor, 1 << 20).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Close);
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn round_trips_text_message() {
        let frame = Frame::new(true, OpCode::Text, b"round trip".to_vec());
        let mut buf = Vec::new();
        encode_frame(&mut buf, &frame).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = decode_frame(&mut cursor, 1 << 20).await.unwrap();
        assert_eq!(decoded.payload, b"round trip");
    }
}
