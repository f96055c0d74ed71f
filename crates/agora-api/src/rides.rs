use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use agora_types::api::{
    Claims, CreateMatchRequest, CreateRideOfferRequest, CreateRideRequestRequest, MAX_RIDE_SEATS,
};
use agora_types::models::{
    MatchStatus, NewRideOffer, NewRideRequest, RideMatch, RideOffer, RideRequest, RideStatus,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validate;

/// Validated route fields shared by requests and offers.
struct Route {
    origin: String,
    destination: String,
    notes: Option<String>,
}

fn check_route(
    origin: &str,
    destination: &str,
    departure_time: DateTime<Utc>,
    seats: i32,
    notes: Option<&str>,
) -> ApiResult<Route> {
    if !(1..=MAX_RIDE_SEATS).contains(&seats) {
        return Err(ApiError::bad_request(format!(
            "seats must be between 1 and {}",
            MAX_RIDE_SEATS
        )));
    }
    if departure_time <= Utc::now() {
        return Err(ApiError::bad_request("departure_time must be in the future"));
    }
    Ok(Route {
        origin: validate::text("origin", origin, validate::MAX_PLACE_LEN)?,
        destination: validate::text("destination", destination, validate::MAX_PLACE_LEN)?,
        notes: validate::optional_text("notes", notes, 1000)?,
    })
}

// -- Requests --

pub async fn list_requests(State(state): State<AppState>) -> ApiResult<Json<Vec<RideRequest>>> {
    Ok(Json(state.db.open_ride_requests(Utc::now()).await?))
}

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRideRequestRequest>,
) -> ApiResult<impl IntoResponse> {
    let route = check_route(
        &req.origin,
        &req.destination,
        req.departure_time,
        req.seats_needed,
        req.notes.as_deref(),
    )?;

    let request = state
        .db
        .create_ride_request(&NewRideRequest {
            user_id: claims.sub,
            origin: route.origin,
            destination: route.destination,
            departure_time: req.departure_time,
            seats_needed: req.seats_needed,
            status: RideStatus::Open,
            notes: route.notes,
        })
        .await?;
    info!("Ride request {} posted by {}", request.id, claims.sub);
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let request = state
        .db
        .get_ride_request(request_id)
        .await?
        .ok_or(ApiError::NotFound("ride request"))?;
    if request.user_id != claims.sub {
        return Err(ApiError::Forbidden("only the requester may cancel"));
    }
    state.db.cancel_ride_request(request_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /rides/requests/{id}/match: Pair the caller's request with every
/// open offer to the same destination.
pub async fn match_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RideMatch>>> {
    let request = state
        .db
        .get_ride_request(request_id)
        .await?
        .ok_or(ApiError::NotFound("ride request"))?;
    if request.user_id != claims.sub {
        return Err(ApiError::Forbidden("only the requester may search for matches"));
    }
    if request.status != RideStatus::Open {
        return Err(ApiError::Conflict("ride request is no longer open"));
    }

    let matches = state
        .db
        .match_request_with_open_offers(&request, Utc::now())
        .await?;
    Ok(Json(matches))
}

// -- Offers --

pub async fn list_offers(State(state): State<AppState>) -> ApiResult<Json<Vec<RideOffer>>> {
    Ok(Json(state.db.open_ride_offers(Utc::now()).await?))
}

pub async fn create_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRideOfferRequest>,
) -> ApiResult<impl IntoResponse> {
    let route = check_route(
        &req.origin,
        &req.destination,
        req.departure_time,
        req.seats_available,
        req.notes.as_deref(),
    )?;
    if req.price.is_some_and(|p| !p.is_finite() || p < 0.0) {
        return Err(ApiError::bad_request("price must be a non-negative number"));
    }

    let offer = state
        .db
        .create_ride_offer(&NewRideOffer {
            user_id: claims.sub,
            origin: route.origin,
            destination: route.destination,
            departure_time: req.departure_time,
            seats_available: req.seats_available,
            price: req.price,
            status: RideStatus::Open,
            notes: route.notes,
        })
        .await?;
    info!("Ride offer {} posted by {}", offer.id, claims.sub);
    Ok((StatusCode::CREATED, Json(offer)))
}

pub async fn cancel_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(offer_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let offer = state
        .db
        .get_ride_offer(offer_id)
        .await?
        .ok_or(ApiError::NotFound("ride offer"))?;
    if offer.user_id != claims.sub {
        return Err(ApiError::Forbidden("only the driver may cancel"));
    }
    state.db.cancel_ride_offer(offer_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Matches --

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<RideMatch>>> {
    Ok(Json(state.db.matches_for_user(claims.sub).await?))
}

/// Propose a specific pairing. The caller must own one side and the two
/// sides must belong to different users.
pub async fn create_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateMatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = state
        .db
        .get_ride_request(req.request_id)
        .await?
        .ok_or(ApiError::NotFound("ride request"))?;
    let offer = state
        .db
        .get_ride_offer(req.offer_id)
        .await?
        .ok_or(ApiError::NotFound("ride offer"))?;

    if request.user_id == offer.user_id {
        return Err(ApiError::bad_request("cannot match a request with your own offer"));
    }
    if request.user_id != claims.sub && offer.user_id != claims.sub {
        return Err(ApiError::Forbidden("you own neither side of this match"));
    }
    if request.status != RideStatus::Open || offer.status != RideStatus::Open {
        return Err(ApiError::Conflict("ride is no longer open"));
    }

    let created = match state.db.create_match(request.id, offer.id).await {
        Ok(m) => m,
        Err(e) if e.is_conflict() => return Err(ApiError::Conflict("match already exists")),
        Err(e) => return Err(e.into()),
    };
    Ok((StatusCode::CREATED, Json(created)))
}

/// The driver accepts; the request is then marked matched.
pub async fn accept_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(match_id): Path<Uuid>,
) -> ApiResult<Json<RideMatch>> {
    let updated = decide(&state, claims.sub, match_id, MatchStatus::Accepted).await?;
    state
        .db
        .set_ride_request_status(updated.request_id, RideStatus::Matched)
        .await?;
    info!("Match {} accepted", match_id);
    Ok(Json(updated))
}

pub async fn reject_match(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(match_id): Path<Uuid>,
) -> ApiResult<Json<RideMatch>> {
    let updated = decide(&state, claims.sub, match_id, MatchStatus::Rejected).await?;
    Ok(Json(updated))
}

/// Only the driver decides, and only while the match is pending. Accepting
/// also needs both the request and the offer to still be open.
async fn decide(
    state: &AppState,
    user_id: Uuid,
    match_id: Uuid,
    status: MatchStatus,
) -> ApiResult<RideMatch> {
    let found = state
        .db
        .get_match(match_id)
        .await?
        .ok_or(ApiError::NotFound("match"))?;
    let offer = state
        .db
        .get_ride_offer(found.offer_id)
        .await?
        .ok_or(ApiError::NotFound("ride offer"))?;

    if offer.user_id != user_id {
        return Err(ApiError::Forbidden("only the driver may answer a match"));
    }
    if found.status != MatchStatus::Pending {
        return Err(ApiError::Conflict("match already answered"));
    }

    if status == MatchStatus::Accepted {
        let request = state
            .db
            .get_ride_request(found.request_id)
            .await?
            .ok_or(ApiError::NotFound("ride request"))?;
        if request.status != RideStatus::Open || offer.status != RideStatus::Open {
            return Err(ApiError::Conflict("ride is no longer open"));
        }
    }

    // The update only applies while the row is still pending.
    state
        .db
        .answer_match(match_id, status)
        .await?
        .ok_or(ApiError::Conflict("match already answered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seats_are_bounded() {
        let later = Utc::now() + Duration::hours(2);
        assert!(check_route("Campus", "Airport", later, 0, None).is_err());
        assert!(check_route("Campus", "Airport", later, MAX_RIDE_SEATS + 1, None).is_err());
        assert!(check_route("Campus", "Airport", later, 3, None).is_ok());
    }

    #[test]
    fn departure_must_be_ahead() {
        let earlier = Utc::now() - Duration::minutes(1);
        assert!(check_route("Campus", "Airport", earlier, 1, None).is_err());
    }

    #[test]
    fn places_are_trimmed() {
        let later = Utc::now() + Duration::hours(2);
        let route = check_route(" Campus ", "Airport", later, 1, Some("  ")).unwrap();
        assert_eq!(route.origin, "Campus");
        assert!(route.notes.is_none());
        assert!(check_route("", "Airport", later, 1, None).is_err());
    }
}
