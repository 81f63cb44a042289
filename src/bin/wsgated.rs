//! Command-line entry point: parses flags, builds a `ServerConfig`, binds
//! the listener, and runs the accept loop alongside the operator REPL
//! until `quit`/SIGINT.
//!
//! Flag shape grounded on `other_examples`' `echo-session-ws-gateway`
//! gateway binary (`clap::Parser` with long flags and sensible
//! defaults); the routing/pool/ACL flags are this crate's own.

use clap::Parser;
use socket_flow::acl::Acl;
use socket_flow::config::{AclConfig, PoolConfig, Route, ServerConfig, WebSocketConfig};
use socket_flow::repl;
use socket_flow::server::Server;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "WebSocket gateway server")]
struct Args {
    /// Port to listen on.
    #[arg(default_value_t = 4567)]
    port: u16,

    /// How incoming messages are routed between sessions.
    #[arg(long, value_enum, default_value_t = RouteArg::Chat)]
    route: RouteArg,

    /// Path to a host ACL file (decimal count header + one host per line).
    #[arg(long)]
    hosts_file: Option<String>,

    /// Path to an origin ACL file, same format as --hosts-file.
    #[arg(long)]
    origins_file: Option<String>,

    /// Accept a bare `\n\n` request terminator, for old Hixie-75 clients.
    #[arg(long)]
    lenient_terminator: bool,

    /// Allow every host/origin when no ACL file is given (or one loads to
    /// a zero count), instead of the default deny-all.
    #[arg(long)]
    allow_all_if_unconfigured: bool,

    /// PEM certificate chain; enables TLS when given together with --tls-key.
    #[arg(long)]
    tls_cert: Option<String>,

    /// PEM private key matching --tls-cert.
    #[arg(long)]
    tls_key: Option<String>,

    /// Maximum concurrent in-flight handshakes.
    #[arg(long, default_value_t = 64)]
    connect_workers: usize,

    /// Maximum concurrent open sessions.
    #[arg(long, default_value_t = 256)]
    io_workers: usize,

    /// Maximum size of a single frame, in bytes.
    #[arg(long, default_value_t = 16 << 20)]
    max_frame_size: usize,

    /// Maximum size of a reassembled message, in bytes.
    #[arg(long, default_value_t = 64 << 20)]
    max_message_size: usize,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum RouteArg {
    Chat,
    Echo,
    None,
}

impl From<RouteArg> for Route {
    fn from(r: RouteArg) -> Self {
        match r {
            RouteArg::Chat => Route::Chat,
            RouteArg::Echo => Route::Echo,
            RouteArg::None => Route::None,
        }
    }
}

fn load_tls_config(cert_path: &str, key_path: &str) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {key_path}"))?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    // Tokio sockets never deliver SIGPIPE; a write to a closed peer just
    // surfaces as Err(BrokenPipe), same as any other IO error.
    log::info!("broken-pipe writes are handled as ordinary IO errors, no SIGPIPE handling needed");
    let args = Args::parse();

    let tls_config = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => Some(load_tls_config(cert, key)?),
        (None, None) => None,
        _ => anyhow::bail!("--tls-cert and --tls-key must be given together"),
    };

    let config = ServerConfig {
        web_socket_config: WebSocketConfig {
            max_frame_size: args.max_frame_size,
            max_message_size: args.max_message_size,
        },
        pool_config: PoolConfig {
            connect_workers: args.connect_workers,
            io_workers: args.io_workers,
        },
        acl_config: AclConfig {
            hosts_file: args.hosts_file,
            origins_file: args.origins_file,
            lenient_terminator: args.lenient_terminator,
            allow_all_if_unconfigured: args.allow_all_if_unconfigured,
        },
        route: args.route.into(),
        tls_config,
    };

    // Touch the loader eagerly so a malformed ACL file is reported before
    // the REPL prompt prints, instead of surfacing on the first accept.
    let _ = Acl::load(
        config.acl_config.hosts_file.as_deref(),
        config.acl_config.origins_file.as_deref(),
        config.acl_config.allow_all_if_unconfigured,
    )
    .await?;

    let server = Server::bind(args.port, config).await?;
    let registry = server.registry();
    let shutdown = server.shutdown_handle();

    let repl_shutdown = shutdown.clone();
    tokio::spawn(async move {
        repl::run(registry, repl_shutdown).await;
    });

    let serve_task = tokio::spawn(server.serve());

    tokio::select! {
        result = serve_task => result??,
        _ = tokio::signal::ctrl_c() => {
            log::info!("SIGINT received, shutting down");
            shutdown.trigger();
        }
    }

    Ok(())
}
