use rustls::ServerConfig as RustlsConfig;
use std::sync::Arc;

/// How incoming application messages get routed to other sessions.
/// Mirrors the three dispatch branches the original `communicate()`
/// switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Broadcast every message to all other connected sessions.
    #[default]
    Chat,
    /// Echo every message back to its sender only.
    Echo,
    /// Default subprotocol: loops each message back to its own sender,
    /// same as `Echo`, in the absence of any other negotiated protocol.
    None,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Concurrent in-flight handshakes.
    pub connect_workers: usize,
    /// Concurrent in-flight read/write tasks once a session is open.
    pub io_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            connect_workers: 64,
            io_workers: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AclConfig {
    pub hosts_file: Option<String>,
    pub origins_file: Option<String>,
    /// Accept a bare `\n\n` as the header terminator in addition to
    /// `\r\n\r\n`, for very old Hixie-75 clients.
    pub lenient_terminator: bool,
    /// Escape hatch: when no hosts/origins file is configured (or one
    /// loads to a zero count), allow everything instead of the default
    /// deny-all. Off by default — an unconfigured ACL must fail closed.
    pub allow_all_if_unconfigured: bool,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub web_socket_config: WebSocketConfig,
    pub pool_config: PoolConfig,
    pub acl_config: AclConfig,
    pub route: Route,
    pub tls_config: Option<Arc<RustlsConfig>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            web_socket_config: WebSocketConfig::default(),
            pool_config: PoolConfig::default(),
            acl_config: AclConfig::default(),
            route: Route::default(),
            tls_config: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("web_socket_config", &self.web_socket_config)
            .field("pool_config", &self.pool_config)
            .field("acl_config", &self.acl_config)
            .field("route", &self.route)
            .field("tls_config", &self.tls_config.is_some())
            .finish()
    }
}
