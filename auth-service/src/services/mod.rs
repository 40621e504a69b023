//! Services layer for auth-service.
//!
//! The auth core lives here; persistence, mail and time are reached through
//! the [`CredentialStore`], [`EmailProvider`] and [`Clock`] seams.

mod auth;
mod clock;
mod database;
mod email;
pub mod error;
mod jwt;
mod otp;
mod session;
mod store;
pub mod timeout;

pub use auth::{AuthService, CredentialKind, Principal, Registration, ResendOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use jwt::{IssuedToken, JwtService, TokenClaims};
pub use otp::{IssuedOtp, OtpIssuer};
pub use session::SessionRegistry;
pub use store::{CredentialStore, InMemoryStore};
