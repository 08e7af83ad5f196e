//! Configuration (spec §6): worker groups, scheduler choice, and the
//! master's RPC data ports, loaded from the first file found in a
//! first-match-wins search order.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{DataPorts, DataPortsError, PydronConfig, WorkerGroupConfig, WorkerGroupType};

use crate::error::Result;

/// Loads configuration via the default search order (spec §6).
pub async fn load_config() -> Result<PydronConfig> {
    ConfigLoader::new().load().await
}
