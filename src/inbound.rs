// Receiving side of the webhook protocol.
//
//   verification  – header extraction, freshness window and signature check
//   replay_guard  – optional recently-seen delivery cache
//   dispatcher    – routes a verified payload to registered handlers

pub mod dispatcher;
pub mod replay_guard;
pub mod verification;

pub use dispatcher::{
    DispatchMode, DispatchReport, ErrorCallback, EventDispatcher, HandlerFailure,
};
pub use replay_guard::ReplayGuard;
pub use verification::{VerificationContext, VerificationEngine, VerificationError, VerifiedWebhook};
