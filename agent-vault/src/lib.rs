//! Local, passphrase-protected vault for a self-sovereign identity agent.
//!
//! ```no_run
//! use agent_vault::storage::FileStore;
//! use agent_vault::IdentityVault;
//!
//! # fn main() -> Result<(), agent_vault::VaultError> {
//! let store = FileStore::open("/var/lib/agent")?;
//! let mut vault = IdentityVault::new(store);
//!
//! let recovery_phrase = vault.initialize("correct horse battery staple", None)?;
//! let did = vault.get_agent_did()?;
//! println!("{} (write down: {})", did.uri(), recovery_phrase.as_str());
//!
//! vault.lock()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod security;
pub mod storage;
pub mod vault;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use vault::{
    IdentityVault, SharedVault, VaultBackup, VaultError, VaultResult, VaultState, VaultStatus,
};

/// Install a fmt subscriber filtered by `RUST_LOG` (default
/// `agent_vault=info`). Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_vault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
