use crate::error::Error;
use crate::frame::{Frame, OpCode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

/// Reads one RFC6455/Hybi-07/Hybi-10 frame off `reader`. Shared by all
/// three drafts since their frame shape is byte-for-byte identical; only
/// the handshake differs between them.
///
/// `require_mask` should be `true` when reading frames sent by a client
/// (server-side read path): masking is mandatory in that direction and a
/// clear frame must be rejected.
pub async fn decode_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
    require_mask: bool,
) -> Result<Frame, Error> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let final_fragment = (header[0] & 0b1000_0000) != 0;
    let opcode = OpCode::from(header[0] & 0b0000_1111)?;

    let rsv1 = (header[0] & 0b0100_0000) != 0;
    let rsv2 = (header[0] & 0b0010_0000) != 0;
    let rsv3 = (header[0] & 0b0001_0000) != 0;
    if rsv1 || rsv2 || rsv3 {
        return Err(Error::RSVNotZero);
    }

    if !final_fragment && opcode.is_control() {
        return Err(Error::ControlFramesFragmented);
    }

    let masked = (header[1] & 0b1000_0000) != 0;
    if require_mask && !masked {
        return Err(Error::MaskRequired);
    }

    let mut length = (header[1] & 0b0111_1111) as usize;
    if length > 125 && opcode.is_control() {
        return Err(Error::ControlFramePayloadSize);
    }

    if length == 126 {
        let mut be_bytes = [0u8; 2];
        reader.read_exact(&mut be_bytes).await?;
        length = u16::from_be_bytes(be_bytes) as usize;
    } else if length == 127 {
        let mut be_bytes = [0u8; 8];
        reader.read_exact(&mut be_bytes).await?;
        let extended = u64::from_be_bytes(be_bytes);
        if extended & (1 << 63) != 0 {
            return Err(Error::ExtendedLengthHighBitSet);
        }
        length = extended as usize;
    }

    if length > max_frame_size {
        return Err(Error::MaxFrameSize);
    }

    let mask = if masked {
        let mut mask = [0u8; 4];
        reader.read_exact(&mut mask).await?;
        Some(mask)
    } else {
        None
    };

    let mut payload = vec![0u8; length];
    match timeout(Duration::from_secs(5), reader.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(elapsed) => return Err(elapsed.into()),
    }

    if let Some(mask) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok(Frame::new(final_fragment, opcode, payload))
}

/// Encodes and writes one frame. `mask` is `true` for frames sent by a
/// client (the server side of this crate always passes `false`).
pub async fn encode_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), Error> {
    write_frame(writer, frame, false).await
}

pub async fn encode_frame_masked<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), Error> {
    write_frame(writer, frame, true).await
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
    mask: bool,
) -> Result<(), Error> {
    let first_byte = (frame.final_fragment as u8) << 7 | frame.opcode.as_u8();
    let payload_len = frame.payload.len();

    writer.write_all(&[first_byte]).await?;

    let mask_key = if mask {
        let mut rng = StdRng::from_rng(rand::thread_rng());
        Some([
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
        ])
    } else {
        None
    };
    let mask_bit = if mask { 0b1000_0000 } else { 0 };

    if payload_len <= 125 {
        writer.write_all(&[mask_bit | payload_len as u8]).await?;
    } else if payload_len <= 65535 {
        writer
            .write_all(&[mask_bit | 126, (payload_len >> 8) as u8, payload_len as u8])
            .await?;
    } else {
        let bytes = payload_len.to_be_bytes();
        let mut header = [0u8; 9];
        header[0] = mask_bit | 127;
        header[1..].copy_from_slice(&bytes);
        writer.write_all(&header).await?;
    }

    match mask_key {
        Some(key) => {
            writer.write_all(&key).await?;
            let masked: Vec<u8> = frame
                .payload
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ key[i % 4])
                .collect();
            writer.write_all(&masked).await?;
        }
        None => {
            writer.write_all(&frame.payload).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn decodes_masked_hello_text_frame() {
        // "Hello" masked with key 37 fa 21 3d, per RFC6455 §5.7 example.
        let bytes: &[u8] = &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut cursor = Cursor::new(bytes);
        let frame = decode_frame(&mut cursor, 1 << 20, true).await.unwrap();
        assert!(frame.final_fragment);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"Hello");
    }

    #[tokio::test]
    async fn rejects_unmasked_client_frame() {
        let bytes: &[u8] = &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o'];
        let mut cursor = Cursor::new(bytes);
        let err = decode_frame(&mut cursor, 1 << 20, true).await.unwrap_err();
        assert!(matches!(err, Error::MaskRequired));
    }

    #[tokio::test]
    async fn rejects_fragmented_control_frame() {
        let bytes: &[u8] = &[0x09, 0x00];
        let mut cursor = Cursor::new(bytes);
        let err = decode_frame(&mut cursor, 1 << 20, false).await.unwrap_err();
        assert!(matches!(err, Error::ControlFramesFragmented));
    }

    #[tokio::test]
    async fn encode_uses_minimal_length_encoding() {
        let mut out = Vec::new();
        let frame = Frame::new(true, OpCode::Binary, vec![0u8; 200]);
        encode_frame(&mut out, &frame).await.unwrap();
        assert_eq!(out[0], 0b1000_0010);
        assert_eq!(out[1], 126);
        assert_eq!(&out[2..4], &200u16.to_be_bytes());
    }

    #[tokio::test]
    async fn rejects_extended_length_with_high_bit_set() {
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&(1u64 << 63).to_be_bytes());
        let mut cursor = Cursor::new(bytes);
        let err = decode_frame(&mut cursor, 1 << 20, false).await.unwrap_err();
        assert!(matches!(err, Error::ExtendedLengthHighBitSet));
    }

    #[tokio::test]
    async fn round_trips_large_binary_frame() {
        let payload = vec![7u8; 70_000];
        let frame = Frame::new(true, OpCode::Binary, payload.clone());
        let mut buf = Vec::new();
        encode_frame(&mut buf, &frame).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = decode_frame(&mut cursor, 1 << 20, false).await.unwrap();
        assert_eq!(decoded.payload, payload);
    }
}
