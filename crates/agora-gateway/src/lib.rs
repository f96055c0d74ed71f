pub mod connection;
pub mod feed;
pub mod live_relay;
pub mod realtime;
