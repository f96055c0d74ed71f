use std::sync::Arc;

use agora_ai::{GeminiClient, Geocoder};
use agora_db::Database;
use agora_gateway::connection::GatewayContext;
use agora_gateway::realtime::RealtimeClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub realtime: RealtimeClient,
    pub ai: GeminiClient,
    pub live_model: String,
    pub geocoder: Geocoder,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn gateway(&self) -> GatewayContext {
        GatewayContext {
            db: self.db.clone(),
            realtime: self.realtime.clone(),
        }
    }
}
