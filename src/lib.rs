/// MTD Sync - metadata synchronization with the INPN MTD service
///
/// Pulls acquisition frameworks and datasets exposed as XML by the remote
/// metadata service, reconciles them by UUID with the local store, resolves
/// their actors to organisms and users, and provisions unknown digitizers.

pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod server;
pub mod sync;
pub mod xml;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use sync::{SyncEngine, SyncReport, SyncService};
