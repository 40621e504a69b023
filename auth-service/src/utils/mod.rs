pub mod password;
pub mod validation;

pub use password::{
    hash_password, validate_email, validate_password_policy, verify_password, Password,
    PasswordHashString,
};
pub use validation::ValidatedJson;
