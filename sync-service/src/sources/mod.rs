pub mod fluvius;
pub mod short_url;

pub use fluvius::FluviusSource;
pub use short_url::{ShortUrlClient, ShortUrlRequest};
