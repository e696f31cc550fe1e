pub mod memory;
pub mod password_token;
pub mod user;

pub use memory::{InMemoryTokenStore, MemoryStoreError};
pub use password_token::{ActiveTokenStore, PasswordTokenRepository, TokenStore};
pub use user::{AccountStore, UserRepository};
