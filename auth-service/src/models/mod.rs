pub mod otp_challenge;
pub mod session;
pub mod user;

pub use otp_challenge::OtpChallenge;
pub use session::{Session, SessionInfo};
pub use user::{normalize_email, User, UserResponse};
