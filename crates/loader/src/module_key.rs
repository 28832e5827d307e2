//! The module-key collaborator interface
//!
//! `ModuleKey`/`ResolvedModuleKey` are implemented by whatever resolves
//! `import` statements to source text (package resolver, filesystem, HTTP
//! client) — all external to this core. The module cache only needs the
//! trait boundary to drive `getOrLoad`.

use pkl_rt::PklResult;

use crate::security::SecurityManager;

/// A key identifying an importable module, before resolution.
pub trait ModuleKey: Send + Sync {
    /// The URI as the importer wrote it.
    fn uri(&self) -> &str;
    fn is_cached(&self) -> bool;
    fn is_std_lib(&self) -> bool;
    fn is_globbable(&self) -> bool;
    fn resolve(&self, security_manager: &dyn SecurityManager) -> PklResult<Box<dyn ResolvedModuleKey>>;
    fn resolve_uri(&self, glob_uri: &str) -> PklResult<String>;
}

/// The result of resolving a [`ModuleKey`]: something that can load source
/// text.
pub trait ResolvedModuleKey: Send + Sync {
    fn load_source(&self) -> PklResult<String>;
    fn uri(&self) -> &str;
}

