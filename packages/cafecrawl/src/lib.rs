pub mod core;
pub mod error;
pub mod session;

pub use core::CafeCrawlCore;

pub use error::Error;
pub use error::FetchError;
pub use error::FetchErrorKind;
