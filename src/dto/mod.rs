pub mod oauth;

pub use oauth::*;
