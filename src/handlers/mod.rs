pub mod health;
pub mod otp;
pub mod password_reset;
pub mod validation;

pub use health::health_check;
pub use otp::{request_otp, verify_otp};
pub use password_reset::{request_password_reset, reset_password};
