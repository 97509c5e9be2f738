//! Native social SDK authentication.
//!
//! An [`AuthenticationOrchestrator`] asks a native identity SDK (through
//! [`NativeLoginSdk`]) for an access token, checks the granted permissions,
//! exchanges the token with the provider for a [`Credential`], and reports
//! exactly one outcome per `start()`.
//!
//! ```text
//! start() ─► SdkSessionBridge ─► native callback / lifecycle event
//!                                   │
//!                                   ▼
//!                          TokenExchangeClient ─► completion(Credential | AuthError)
//! ```

mod bridge;
mod context;
pub mod credential;
pub mod error;
pub mod exchange;
pub mod facebook;
pub mod orchestrator;
pub mod permissions;
pub mod registry;
pub mod router;
pub mod sdk;
pub mod session_fsm;

#[cfg(test)]
mod tests;

pub use context::AuthCompletion;
pub use credential::{Credential, UserProfile};
pub use error::{AuthError, AuthErrorKind, AuthResult, ErrorCause};
pub use exchange::{
    ExchangeOptions, ExchangeSettings, ExchangeTransport, ReqwestTransport, RetryConfig,
    TokenExchangeClient, TransportError, TransportResponse,
};
pub use native_auth_config::PartialGrantPolicy;
pub use orchestrator::{
    AuthenticationOrchestrator, OrchestratorSettings, ProviderBinding, DEFAULT_SCOPE,
};
pub use permissions::{ConnectionDescriptor, Permission, PermissionSet, DEFAULT_PERMISSION};
pub use registry::{AuthenticatorRegistry, NativeAuthenticator, ProviderTag};
pub use router::LifecycleEventRouter;
pub use sdk::{
    AttemptId, NativeAuthResult, NativeCallback, NativeLoginOutcome, NativeLoginRequest,
    NativeLoginSdk, NativeSdkError,
};
pub use session_fsm::SessionState;
