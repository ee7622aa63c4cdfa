//! Authorization-code flow: session state machine, PKCE, and the engine
//! that drives them.

pub mod engine;
pub mod pkce;
pub mod session;

pub use engine::{AuthorizeOutcome, FlowEngine, LoginOutcome};
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier};
pub use session::{
    AuthSession, AuthorizationCode, AuthorizeRequest, ConnectionInfo, ConnectionKind, FlowState,
};
