pub mod error;
pub mod queries;
pub mod query;
pub mod storage;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use agora_types::models::Table;

pub use error::{DbError, Result};
pub use query::Query;

/// Client for the hosted backend's REST table interface and object storage.
///
/// Every request authenticates with the service key, so row-level policies
/// are enforced by the handlers that call into this type, not by the backend.
#[derive(Clone)]
pub struct Database {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl Database {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, service_key)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, service_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub async fn select<T: DeserializeOwned>(&self, table: Table, query: &Query) -> Result<Vec<T>> {
        debug!("select {} {:?}", table, query.pairs());
        let req = self
            .request(Method::GET, &self.table_url(table))
            .query(&query.pairs());
        send_json(req).await
    }

    /// First matching row, or `None` when the filter matches nothing.
    pub async fn select_one<T: DeserializeOwned>(&self, table: Table, query: Query) -> Result<Option<T>> {
        let rows: Vec<T> = self.select(table, &query.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one object or an array of objects; returns the stored rows.
    pub async fn insert<T, B>(&self, table: Table, body: &B) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!("insert into {}", table);
        let req = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(body);
        send_json(req).await
    }

    pub async fn insert_one<T, B>(&self, table: Table, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let rows: Vec<T> = self.insert(table, body).await?;
        rows.into_iter().next().ok_or(DbError::NoRows)
    }

    /// Insert, or merge into the row with the same primary key.
    pub async fn upsert_one<T, B>(&self, table: Table, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!("upsert into {}", table);
        let req = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(body);
        let rows: Vec<T> = send_json(req).await?;
        rows.into_iter().next().ok_or(DbError::NoRows)
    }

    pub async fn update<T, B>(&self, table: Table, query: &Query, patch: &B) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!("update {} {:?}", table, query.pairs());
        let req = self
            .request(Method::PATCH, &self.table_url(table))
            .query(&query.pairs())
            .header("Prefer", "return=representation")
            .json(patch);
        send_json(req).await
    }

    /// Delete matching rows and return them.
    pub async fn delete<T: DeserializeOwned>(&self, table: Table, query: &Query) -> Result<Vec<T>> {
        if query.is_unfiltered() {
            // The backend rejects unfiltered deletes; fail before the round trip.
            warn!("refusing unfiltered delete on {}", table);
            return Err(DbError::Unfiltered);
        }
        debug!("delete from {} {:?}", table, query.pairs());
        let req = self
            .request(Method::DELETE, &self.table_url(table))
            .query(&query.pairs())
            .header("Prefer", "return=representation");
        send_json(req).await
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(status_error(status, &body));
    }

    Ok(serde_json::from_slice(&body)?)
}

pub(crate) fn status_error(status: StatusCode, body: &[u8]) -> DbError {
    let body = String::from_utf8_lossy(body);
    DbError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    }
}
