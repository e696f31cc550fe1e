pub mod password_token;

pub use password_token::{NewPasswordToken, PasswordToken, TokenPurpose, UnknownPurpose};
