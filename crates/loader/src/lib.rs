//! Module cache, stdlib bootstrap, resource mediation and the programmatic
//! embedding surface sitting on top of `pkl-rt`.

pub mod cache;
pub mod context;
pub mod module_key;
pub mod resource;
pub mod security;
pub mod stdlib;

pub use cache::ModuleCache;
pub use context::{EvaluatorContext, EvaluatorContextBuilder, EvaluatorLogger, ProjectDependency, TracingLogger};
pub use module_key::{ModuleKey, ResolvedModuleKey};
pub use resource::{ResourceHandle, ResourceMediator, ResourceReader};
pub use security::{AllowAllSecurityManager, SecurityManager};
pub use stdlib::{base_class, get_stdlib_module, is_stdlib_module, STDLIB_MODULE_NAMES};
