use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::api::{BookSearchQuery, Claims, CreateBookRequest, UploadResponse};
use agora_types::models::{Book, Bucket, NewBook};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::{self, UploadKind};
use crate::validate;

const BOOK_LIST_LIMIT: u32 = 100;

fn check_url(field: &str, value: Option<&str>) -> ApiResult<Option<String>> {
    let value = validate::optional_text(field, value, 2048)?;
    if let Some(url) = &value {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ApiError::bad_request(format!("{} must be an http(s) URL", field)));
        }
    }
    Ok(value)
}

pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookSearchQuery>,
) -> ApiResult<Json<Vec<Book>>> {
    let books = state
        .db
        .search_books(query.q.as_deref(), query.subject.as_deref(), BOOK_LIST_LIMIT)
        .await?;
    Ok(Json(books))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<Json<Book>> {
    let book = state
        .db
        .get_book(book_id)
        .await?
        .ok_or(ApiError::NotFound("book"))?;
    Ok(Json(book))
}

pub async fn create_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookRequest>,
) -> ApiResult<impl IntoResponse> {
    let book = NewBook {
        title: validate::text("title", &req.title, 300)?,
        author: validate::text("author", &req.author, 200)?,
        subject: validate::optional_text("subject", req.subject.as_deref(), validate::MAX_NAME_LEN)?,
        description: validate::optional_text("description", req.description.as_deref(), 2000)?,
        file_url: check_url("file_url", req.file_url.as_deref())?,
        cover_url: check_url("cover_url", req.cover_url.as_deref())?,
        uploaded_by: claims.sub,
    };

    let created = state.db.create_book(&book).await?;
    info!("Book {} added by {}", created.id, claims.sub);
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /books/files: Raw PDF or cover image. The returned URL goes into
/// `file_url` or `cover_url` of a new book.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let content_type = uploads::check(UploadKind::Document, &headers, &bytes)?;
    let size = bytes.len() as u64;
    let url = uploads::store(&state.db, Bucket::Books, claims.sub, bytes, &content_type).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url, size })))
}

pub async fn delete_book(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(book_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let book = state
        .db
        .get_book(book_id)
        .await?
        .ok_or(ApiError::NotFound("book"))?;
    if book.uploaded_by != claims.sub {
        return Err(ApiError::Forbidden("only the uploader may delete a book"));
    }
    state.db.delete_book(book_id, claims.sub).await?;

    // Files hosted in our own bucket go with the row.
    let stored: Vec<String> = [book.file_url.as_deref(), book.cover_url.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(|u| state.db.object_path_from_url(Bucket::Books, u))
        .collect();
    if let Err(e) = state.db.remove(Bucket::Books, &stored).await {
        warn!("Failed to remove files of book {}: {}", book_id, e);
    }

    Ok(StatusCode::NO_CONTENT)
}
