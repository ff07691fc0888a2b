//! Capabilities the kernel ships with.
//!
//! `Ping` answers liveness checks. The `Syscall.*` family drives the kernel
//! itself: connection authentication, shutdown and introspection.

mod ping;
mod syscall;

use courier_config::Config;

use crate::registry::{Registry, RegistryBuilder, RegistryError};
use crate::shutdown::ShutdownFlag;

pub use self::ping::{PING, Ping, PingPayload};
pub use self::syscall::{
    AUTHENTICATE, Authenticate, Catalogue, Credentials, DESCRIBE, Describe, NoInput, SHUTDOWN,
    Session, Shutdown, ShutdownAck,
};

/// Process-wide inputs the built-in capabilities depend on.
#[derive(Debug, Clone, Default)]
pub struct KernelOptions {
    /// Secret expected by `Syscall.Authenticate`; `None` accepts any caller
    /// that can reach the socket.
    pub auth_token: Option<String>,
    /// Flag flipped by `Syscall.Shutdown`.
    pub shutdown: ShutdownFlag,
}

impl KernelOptions {
    /// Derives options from configuration and a shutdown flag.
    #[must_use]
    pub fn from_config(config: &Config, shutdown: ShutdownFlag) -> Self {
        Self {
            auth_token: config.auth_token().map(str::to_owned),
            shutdown,
        }
    }
}

/// Starts a registry builder preloaded with the built-in capabilities.
///
/// Embedders register their own capabilities on the returned builder before
/// calling [`RegistryBuilder::build`].
#[must_use]
pub fn builtin_capabilities(options: &KernelOptions) -> RegistryBuilder {
    RegistryBuilder::new()
        .register(Ping)
        .register(Authenticate::new(options.auth_token.clone()))
        .register(Shutdown::new(options.shutdown.clone()))
}

/// Builds the registry of built-in capabilities.
///
/// # Errors
///
/// Returns [`RegistryError`] if the built-in table is inconsistent.
pub fn builtin_registry(options: &KernelOptions) -> Result<Registry, RegistryError> {
    builtin_capabilities(options).build()
}
