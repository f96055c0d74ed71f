pub mod ai;
pub mod books;
pub mod chats;
pub mod error;
pub mod geocode;
pub mod groups;
pub mod middleware;
pub mod posts;
pub mod profiles;
pub mod rides;
pub mod routes;
pub mod state;
pub mod stories;
pub mod uploads;
pub mod validate;
pub mod ws;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
