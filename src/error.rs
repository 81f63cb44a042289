use crate::frame::Frame;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum Error {
    // Sender / Receiver Errors
    #[error("{source}")]
    SendError {
        #[from]
        source: SendError<Frame>,
    },

    #[error("channel communication error")]
    CommunicationError,

    // General Errors
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    // Handshake errors
    #[error("Invalid handshake request method and version")]
    InvalidHTTPHandshake,

    #[error("Connection: Upgrade header missing in the request")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing in the request")]
    NoUpgradeHeaderPresent,

    #[error("Host header missing in the request")]
    NoHostHeaderPresent,

    #[error("Couldn't find Sec-WebSocket-Key header in the request")]
    NoSecWebsocketKey,

    #[error("Couldn't find Sec-WebSocket-Key1/Key2 headers in the request")]
    NoHybi00Keys,

    #[error("malformed Hybi-00 key: digits/space ratio is not an integral multiple")]
    InvalidHybi00Key,

    #[error("Server didn't upgrade the connection")]
    NoUpgrade,

    #[error("Sever didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("Incomplete HTTP request")]
    IncompleteHTTPRequest,

    #[error("host `{0}` is not present in the configured host ACL")]
    HostNotAllowed(String),

    #[error("origin `{0}` is not present in the configured origin ACL")]
    OriginNotAllowed(String),

    #[error("failed to load ACL file `{0}`: {1}")]
    AclLoad(String, String),

    // Framing Errors
    #[error("RSV not zero")]
    RSVNotZero,

    #[error("Control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("Control frame with invalid payload size, can't be greater than 125")]
    ControlFramePayloadSize,

    #[error("fragment_size: `{0}` can't be greater than max_frame_size: `{1}`")]
    CustomFragmentSizeExceeded(usize, usize),

    #[error("Max frame size reached")]
    MaxFrameSize,

    #[error("Max message size reached")]
    MaxMessageSize,

    #[error("Masked frame required but mask bit was not set")]
    MaskRequired,

    #[error("64-bit extended payload length had its high bit set")]
    ExtendedLengthHighBitSet,

    // Fragmentation Errors
    #[error("Invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("Incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("Invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    #[error("Invalid Opcode")]
    InvalidOpcode,

    // Dispatcher / pool errors
    #[error("worker pool exhausted, connection dropped")]
    PoolExhausted,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Maps a frame/protocol-level error onto the close status code a
    /// CLOSE frame should carry before the connection drops, per the
    /// error-handling policy: framing errors get a specific code, IO
    /// errors get none.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::RSVNotZero
            | Error::ControlFramesFragmented
            | Error::ControlFramePayloadSize
            | Error::InvalidFrameFragmentation
            | Error::FragmentedInProgress
            | Error::InvalidContinuationFrame
            | Error::MaskRequired
            | Error::ExtendedLengthHighBitSet => Some(1002),
            Error::InvalidOpcode => Some(1003),
            Error::InvalidUtf8 | Error::FromUtf8Error { .. } => Some(1007),
            Error::MaxFrameSize | Error::MaxMessageSize | Error::CustomFragmentSizeExceeded(..) => {
                Some(1009)
            }
            Error::PoolExhausted | Error::Internal(_) => Some(1011),
            _ => None,
        }
    }
}
