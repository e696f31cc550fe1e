pub mod auth;
pub mod email;
pub mod one_time_code;
pub mod otp;
pub mod password_reset;
pub mod token_codec;
pub mod token_lifecycle;
pub mod ttl_policy;

pub use email::EmailService;
pub use one_time_code::OtpService;
pub use password_reset::PasswordResetService;
pub use token_lifecycle::{IssuedToken, TokenLifecycle};
pub use ttl_policy::{DEFAULT_TTL_MINUTES, TtlPolicy};
