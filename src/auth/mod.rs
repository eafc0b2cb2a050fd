pub mod device_code;
pub mod negotiator;
pub mod service;

pub use device_code::DeviceCodeAuthService;
pub use negotiator::{AuthNegotiator, AuthOutcome};
pub use service::{AuthResult, AuthScheme, AuthService, SecretToken};
