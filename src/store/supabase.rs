//! Supabase REST (PostgREST) client using the service_role key

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::Config;

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            service_role_key: config.rest_key().to_string(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn query_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            self.rest_url(table)
        } else {
            format!("{}?{}", self.rest_url(table), query)
        }
    }

    /// Attach service-role credentials to a request
    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.query_url(table, query)))
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.query_url(table, query)))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let response = check_status(response).await?;
        response.json().await.map(Some).map_err(SupabaseError::Parse)
    }

    /// Count rows matching a query (exact count via Content-Range)
    pub async fn count(&self, table: &str, query: &str) -> Result<u64, SupabaseError> {
        let query = if query.is_empty() {
            "select=id&limit=1".to_string()
        } else {
            format!("{}&select=id&limit=1", query)
        };

        let response = self
            .authed(self.client.get(self.query_url(table, &query)))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response
            .headers()
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or(SupabaseError::MissingCount)
    }

    /// Make an authenticated POST request (insert)
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;

        // PostgREST returns an array, get first element
        let results: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let response = self
            .authed(self.client.patch(self.query_url(table, query)))
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }

    /// PATCH returning the updated rows; an empty result means the filter matched nothing
    pub async fn update_returning<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<Vec<R>, SupabaseError> {
        let response = self
            .authed(self.client.patch(self.query_url(table, query)))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Upsert (insert or update on conflict)
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        data: &T,
        on_conflict: &str,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}?on_conflict={}", self.rest_url(table), on_conflict);

        let response = self
            .authed(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }
}

pub(crate) async fn check_status(response: Response) -> Result<Response, SupabaseError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SupabaseError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Extract the total from a `Content-Range` header such as `0-9/42` or `*/0`
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// Build a PostgREST `in.(...)` filter value
pub fn in_list<T: std::fmt::Display>(values: &[T]) -> String {
    let joined = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({})", joined)
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Count missing from response")]
    MissingCount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_in_list() {
        let a = Uuid::nil();
        assert_eq!(
            in_list(&[a, a]),
            "in.(00000000-0000-0000-0000-000000000000,00000000-0000-0000-0000-000000000000)"
        );
        assert_eq!(in_list::<u8>(&[]), "in.()");
    }

    #[test]
    fn test_query_url() {
        let config = Config::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("https://demo.supabase.co".to_string()),
            _ => None,
        })
        .unwrap();
        let client = SupabaseClient::new(&config);
        assert_eq!(
            client.query_url("profiles", "id=eq.1"),
            "https://demo.supabase.co/rest/v1/profiles?id=eq.1"
        );
        assert_eq!(
            client.query_url("profiles", ""),
            "https://demo.supabase.co/rest/v1/profiles"
        );
    }
}
