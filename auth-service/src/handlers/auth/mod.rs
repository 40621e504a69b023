pub mod registration;
pub mod session;

pub use registration::{register, resend_otp, verify_otp};
pub use session::{close_session, login, open_session};
