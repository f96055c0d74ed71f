pub mod client;
pub mod error;
pub mod geocode;
pub mod live;

pub use client::GeminiClient;
pub use error::AiError;
pub use geocode::Geocoder;
