//! pmrotate IPC - Supervisor control channel over Unix sockets

pub mod client;
pub mod protocol;

pub use client::{ConnectionState, ReconnectPolicy, SupervisorClient};
pub use protocol::{Request, Response};

use async_trait::async_trait;
use pmrotate_core::{ManagedProcess, Result};

/// Anything that can report the supervisor's current process table
#[async_trait]
pub trait ProcessSource: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<ManagedProcess>>;
}

#[async_trait]
impl ProcessSource for SupervisorClient {
    async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
        SupervisorClient::list_processes(self).await
    }
}
