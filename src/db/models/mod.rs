//! Database models split into domain-specific modules.

pub mod account;
pub mod catalog;
pub mod login_otp;
pub mod price;

pub use account::*;
pub use catalog::*;
pub use login_otp::*;
pub use price::*;
