//! Per-session connection state machine: CONNECTING → OPEN → CLOSING →
//! CLOSED. Each accepted socket is driven by exactly one task for its
//! whole lifetime (the single-owner invariant a hand-rolled dispatcher
//! would enforce via a worker-token field falls out for free here), and
//! every suspension point in the OPEN-state loop also observes the
//! shutdown broadcast so an orderly shutdown can unwind a connection
//! that's idle mid-read.
//!
//! Grounded on the teacher's `read.rs::poll_messages` for fragment
//! accumulation and control-frame interleaving, generalized across both
//! wire codecs via [`Draft`].

use crate::acl::Acl;
use crate::codec::{hybi00, rfc6455, Draft};
use crate::config::{Route, WebSocketConfig};
use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::handshake;
use crate::message::Message;
use crate::registry::{Registry, SessionId};
use crate::socket::Socket;
use crate::utf8::Utf8Validator;
use crate::worker::Shutdown;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{split, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

struct FragmentedMessage {
    opcode: OpCode,
    payload: Vec<u8>,
    validator: Option<Utf8Validator>,
}

pub struct ConnectionContext {
    pub config: WebSocketConfig,
    pub route: Route,
    pub acl: Arc<Acl>,
    pub registry: Arc<Registry>,
    pub shutdown: Shutdown,
    pub listen_port: u16,
}

/// Drives one accepted socket through the handshake and then the open
/// connection's read/write loop until it closes, for any reason.
pub async fn run(
    socket: Socket,
    addr: SocketAddr,
    id: SessionId,
    ctx: Arc<ConnectionContext>,
) -> Result<(), Error> {
    let (read_half, mut write_half) = split(socket);
    let mut reader = BufReader::new(read_half);

    let draft = match handshake::negotiate(
        &mut reader,
        &mut write_half,
        &ctx.acl,
        ctx.listen_port,
        true,
    )
    .await
    {
        Ok(draft) => draft,
        Err(e) => {
            warn!("handshake with {addr} failed: {e}");
            return Err(e);
        }
    };
    info!("session {id} ({addr}) negotiated {draft:?}");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(128);
    ctx.registry.register(id, addr, outbound_tx);

    let mut shutdown_rx = ctx.shutdown.subscribe();
    let mut fragmented: Option<FragmentedMessage> = None;
    let max_frame_size = ctx.config.max_frame_size;
    let max_message_size = ctx.config.max_message_size;

    let result: Result<(), Error> = loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                let _ = write_close(&mut write_half, draft, 1001, "server shutting down").await;
                break Ok(());
            }

            maybe_frame = outbound_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        let is_close = frame.opcode == OpCode::Close;
                        if let Err(e) = write_frame(&mut write_half, draft, &frame).await {
                            break Err(e);
                        }
                        if is_close {
                            // A server-initiated close (e.g. the REPL's `kick`)
                            // ends the session the same way a peer-initiated
                            // one does — there is no reply to wait for.
                            break Ok(());
                        }
                    }
                    None => break Ok(()),
                }
            }

            decoded = decode_one(&mut reader, draft, max_frame_size) => {
                match decoded {
                    Ok(frame) => {
                        match handle_frame(frame, &mut fragmented, max_message_size, id, &ctx, &mut write_half, draft).await {
                            Ok(true) => {}
                            Ok(false) => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    if let Err(ref e) = result {
        if let Some(code) = e.close_code() {
            let _ = write_close(&mut write_half, draft, code, "").await;
        }
        debug!("session {id} ({addr}) closed with error: {e}");
    } else {
        debug!("session {id} ({addr}) closed");
    }

    ctx.registry.remove(id);
    result
}

async fn decode_one<R>(reader: &mut BufReader<R>, draft: Draft, max_frame_size: usize) -> Result<Frame, Error>
where
    R: tokio::io::AsyncRead + Unpin,
{
    if draft.uses_byte_stuffed_framing() {
        hybi00::decode_frame(reader, max_frame_size).await
    } else {
        rfc6455::decode_frame(reader, max_frame_size, true).await
    }
}

async fn write_frame<W>(writer: &mut W, draft: Draft, frame: &Frame) -> Result<(), Error>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if draft.uses_byte_stuffed_framing() {
        hybi00::encode_frame(writer, frame).await
    } else {
        rfc6455::encode_frame(writer, frame).await
    }
}

async fn write_close<W>(writer: &mut W, draft: Draft, code: u16, reason: &str) -> Result<(), Error>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let frame = if draft.uses_byte_stuffed_framing() {
        Frame::new(true, OpCode::Close, Vec::new())
    } else {
        Frame::close(code, reason)
    };
    write_frame(writer, draft, &frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Handles one decoded frame against the fragmentation/control-frame
/// rules. Returns `Ok(false)` when the connection should close (a Close
/// frame was processed and echoed).
async fn handle_frame<W>(
    frame: Frame,
    fragmented: &mut Option<FragmentedMessage>,
    max_message_size: usize,
    id: SessionId,
    ctx: &Arc<ConnectionContext>,
    write_half: &mut W,
    draft: Draft,
) -> Result<bool, Error>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    match frame.opcode {
        OpCode::Text | OpCode::Binary if !frame.final_fragment => {
            if fragmented.is_some() {
                return Err(Error::FragmentedInProgress);
            }
            let mut validator = (frame.opcode == OpCode::Text).then(Utf8Validator::new);
            if let Some(v) = validator.as_mut() {
                if !v.push(&frame.payload) {
                    return Err(Error::InvalidUtf8);
                }
            }
            *fragmented = Some(FragmentedMessage {
                opcode: frame.opcode,
                payload: frame.payload,
                validator,
            });
            Ok(true)
        }
        OpCode::Continue => {
            let in_progress = fragmented.as_mut().ok_or(Error::InvalidContinuationFrame)?;
            in_progress.payload.extend_from_slice(&frame.payload);
            if in_progress.payload.len() > max_message_size {
                return Err(Error::MaxMessageSize);
            }
            if let Some(v) = in_progress.validator.as_mut() {
                if !v.push(&frame.payload) {
                    return Err(Error::InvalidUtf8);
                }
            }
            if frame.final_fragment {
                let completed = fragmented.take().unwrap();
                if let Some(v) = &completed.validator {
                    if !v.finish() {
                        return Err(Error::InvalidUtf8);
                    }
                }
                dispatch_message(
                    Frame::new(true, completed.opcode, completed.payload),
                    id,
                    ctx,
                )
                .await?;
            }
            Ok(true)
        }
        OpCode::Text | OpCode::Binary => {
            if fragmented.is_some() {
                return Err(Error::InvalidFrameFragmentation);
            }
            if frame.opcode == OpCode::Text && !crate::utf8::valid(&frame.payload) {
                return Err(Error::InvalidUtf8);
            }
            dispatch_message(frame, id, ctx).await?;
            Ok(true)
        }
        OpCode::Close => {
            write_close(write_half, draft, 1000, "").await?;
            Ok(false)
        }
        OpCode::Ping => {
            write_frame(write_half, draft, &Frame::new(true, OpCode::Pong, frame.payload)).await?;
            Ok(true)
        }
        OpCode::Pong => Ok(true),
    }
}

async fn dispatch_message(frame: Frame, id: SessionId, ctx: &Arc<ConnectionContext>) -> Result<(), Error> {
    let _ = Message::from_frame(frame.clone())?;
    match ctx.route {
        Route::Chat => ctx.registry.broadcast(frame, Some(id)).await,
        Route::Echo | Route::None => {
            ctx.registry.unicast(id, frame).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rfc6455;
    use std::io::Cursor;

    #[tokio::test]
    async fn fragmented_text_reassembles_with_ping_interleaved() {
        let ctx = Arc::new(ConnectionContext {
            config: WebSocketConfig::default(),
            route: Route::None,
            acl: Arc::new(Acl::allow_all()),
            registry: Arc::new(Registry::new()),
            shutdown: Shutdown::new(),
            listen_port: 4567,
        });
        let id = SessionId::default_for_test();

        let mut fragmented = None;
        let mut sink = Vec::new();

        let start = Frame::new(false, OpCode::Text, b"Hel".to_vec());
        assert!(handle_frame(start, &mut fragmented, 1 << 20, id, &ctx, &mut sink, Draft::Rfc6455)
            .await
            .unwrap());
        assert!(fragmented.is_some());

        let ping = Frame::new(true, OpCode::Ping, b"hb".to_vec());
        assert!(handle_frame(ping, &mut fragmented, 1 << 20, id, &ctx, &mut sink, Draft::Rfc6455)
            .await
            .unwrap());
        assert!(fragmented.is_some(), "ping must not disturb the in-progress fragment");

        let end = Frame::new(true, OpCode::Continue, b"lo".to_vec());
        assert!(handle_frame(end, &mut fragmented, 1 << 20, id, &ctx, &mut sink, Draft::Rfc6455)
            .await
            .unwrap());
        assert!(fragmented.is_none());

        // The ping reply was written to `sink`; decode it back to confirm shape.
        let mut cursor = Cursor::new(sink);
        let pong = rfc6455::decode_frame(&mut cursor, 1 << 20, false).await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload, b"hb");
    }

    #[tokio::test]
    async fn continuation_without_start_is_rejected() {
        let ctx = Arc::new(ConnectionContext {
            config: WebSocketConfig::default(),
            route: Route::None,
            acl: Arc::new(Acl::allow_all()),
            registry: Arc::new(Registry::new()),
            shutdown: Shutdown::new(),
            listen_port: 4567,
        });
        let id = SessionId::default_for_test();
        let mut fragmented = None;
        let mut sink = Vec::new();
        let frame = Frame::new(true, OpCode::Continue, b"oops".to_vec());
        let err = handle_frame(frame, &mut fragmented, 1 << 20, id, &ctx, &mut sink, Draft::Rfc6455)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidContinuationFrame));
    }
}
