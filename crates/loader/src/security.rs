//! The security-manager collaborator interface

use pkl_rt::PklResult;

/// Gate on resource reads and module resolution. Rejections propagate as
/// an eval error with the security manager's own error as cause; callers
/// build that wrapping themselves since the trait returns a plain
/// `PklResult`.
pub trait SecurityManager: Send + Sync {
    fn check_read_resource(&self, uri: &str) -> PklResult<()>;
    fn check_resolve_module(&self, uri: &str) -> PklResult<()>;
}

/// A manager that allows everything. The default for embeddings that don't
/// need sandboxing, and for the stdlib bootstrap's own temporary context.
pub struct AllowAllSecurityManager;

impl SecurityManager for AllowAllSecurityManager {
    fn check_read_resource(&self, _uri: &str) -> PklResult<()> {
        Ok(())
    }

    fn check_resolve_module(&self, _uri: &str) -> PklResult<()> {
        Ok(())
    }
}
