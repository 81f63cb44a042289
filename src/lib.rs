//! WebSocket gateway server for Tokio.
//!
//! Negotiates Hixie-75, Hybi-00, Hybi-07/10 and RFC 6455 handshakes on
//! the same listening socket, decodes both the legacy byte-stuffed and
//! RFC 6455 frame formats, and routes reassembled messages between
//! sessions tracked in an in-memory registry. An operator REPL and a
//! binary entry point (`wsgated`) sit on top of the library pieces
//! exported here.

pub mod acl;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod registry;
pub mod repl;
pub mod server;
pub mod socket;
pub mod utf8;
pub mod worker;
