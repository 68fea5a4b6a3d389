/// Identity provisioning
///
/// Reconciles users known to the remote identity service with local roles,
/// their organism and their default group.

pub mod provider;
pub mod provisioning;

pub use provider::{IdentityProvider, LocalIdentityProvider, ProvisionedRole, ReconcileKey, RoleInfo};
pub use provisioning::UserProvisioner;
