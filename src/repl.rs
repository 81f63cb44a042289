//! Interactive operator console: list sessions, message one or all of
//! them, kick one or all of them, or shut the server down.
//!
//! Grounded on the teacher's `cmdline()` thread — same verb set and the
//! same "no parameters" / "too few parameters" complaints — adapted to
//! address sessions by their synthetic [`SessionId`] instead of an
//! `IP SOCKET` pair, since a session id already uniquely names a peer.

use crate::frame::{Frame, OpCode};
use crate::registry::{Registry, SessionId};
use crate::worker::Shutdown;
use std::sync::Arc;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

const HELP: &str = "\
------------------------ HELP ------------------------
|  users / online / clients   list connected sessions |
|  send <id> <message>        message one session     |
|  write <id> <message>       alias for send           |
|  sendall <message>          message every session    |
|  writeall <message>         alias for sendall         |
|  kick <id>                  close one session        |
|  close <id>                 alias for kick            |
|  kickall                    close every session      |
|  closeall                   alias for kickall         |
|  help                       show this message        |
|  quit / exit                shut the server down     |
--------------------------------------------------------";

/// Reads commands from stdin until `quit`/`exit`, then triggers shutdown.
pub async fn run(registry: Arc<Registry>, shutdown: Shutdown) {
    let mut lines = BufReader::new(stdin()).lines();
    print!("> ");
    while let Ok(Some(line)) = lines.next_line().await {
        handle_line(&line, &registry, &shutdown).await;
        if line.trim() == "quit" || line.trim() == "exit" {
            break;
        }
        print!("> ");
    }
}

async fn handle_line(line: &str, registry: &Arc<Registry>, shutdown: &Shutdown) {
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match verb {
        "" => {}
        "users" | "online" | "clients" => list_sessions(registry),
        "send" | "write" => send_one(registry, rest).await,
        "sendall" | "writeall" => {
            if rest.is_empty() {
                println!("The command was executed without parameters. Type 'help' for usage.");
            } else {
                registry
                    .broadcast_all(Frame::new(true, OpCode::Text, rest.as_bytes().to_vec()))
                    .await;
            }
        }
        "kick" | "close" => kick_one(registry, rest).await,
        "kickall" | "closeall" => registry.close_all().await,
        "help" => println!("{HELP}"),
        "quit" | "exit" => {
            println!("Shutting client down..\n");
            shutdown.trigger();
        }
        _ => println!("Unrecognized command. Type 'help' to see functions available."),
    }
}

fn list_sessions(registry: &Arc<Registry>) {
    let sessions = registry.list();
    if sessions.is_empty() {
        println!("No clients are currently connected.");
        return;
    }
    for (id, addr) in sessions {
        println!("{id}\t{addr}");
    }
}

async fn send_one(registry: &Arc<Registry>, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let id = match parts.next().filter(|s| !s.is_empty()) {
        Some(id) => id,
        None => {
            println!("The command was executed without parameters. Type 'help' for usage.");
            return;
        }
    };
    let message = parts.next().unwrap_or("").trim();
    if message.is_empty() {
        println!("The command was executed with too few parameters. Type 'help' for usage.");
        return;
    }
    let id: SessionId = match parse_session_id(id) {
        Some(id) => id,
        None => {
            println!("`{id}` is not a valid session id.");
            return;
        }
    };
    let delivered = registry
        .unicast(id, Frame::new(true, OpCode::Text, message.as_bytes().to_vec()))
        .await;
    if !delivered {
        println!("The client that was supposed to receive the message is not connected.");
    }
}

async fn kick_one(registry: &Arc<Registry>, rest: &str) {
    let id = rest.split_whitespace().next();
    let id = match id {
        Some(id) => id,
        None => {
            println!("The command was executed without parameters. Type 'help' for usage.");
            return;
        }
    };
    let id: SessionId = match parse_session_id(id) {
        Some(id) => id,
        None => {
            println!("`{id}` is not a valid session id.");
            return;
        }
    };
    let delivered = registry.unicast(id, Frame::close(1000, "kicked by operator")).await;
    if !delivered {
        println!("The client that was supposed to be kicked is not connected.");
    }
}

fn parse_session_id(raw: &str) -> Option<SessionId> {
    raw.parse::<u64>().ok().map(SessionId::from_raw)
}
