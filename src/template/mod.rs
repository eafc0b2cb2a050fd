pub mod catalog;
pub mod extensions;

pub use catalog::{ResolvedTemplate, TemplateCatalog};
pub use extensions::{ExtensionAdvisor, ExtensionConsent, ExtensionEntry};
