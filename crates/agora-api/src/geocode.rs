use axum::{
    Json,
    extract::{Query, State},
};

use agora_ai::AiError;
use agora_types::api::{GeocodeResponse, ReverseGeocodeQuery};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /geocode/reverse?lat=&lon=: Place name for the ride board's
/// "use my location" button.
pub async fn reverse(
    State(state): State<AppState>,
    Query(query): Query<ReverseGeocodeQuery>,
) -> ApiResult<Json<GeocodeResponse>> {
    match state.geocoder.reverse(query.lat, query.lon).await {
        Ok(place) => Ok(Json(place)),
        Err(AiError::Status { status: 404, .. }) => Err(ApiError::NotFound("place")),
        Err(e) => Err(e.into()),
    }
}
