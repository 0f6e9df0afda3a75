use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::auth::Session;
use crate::model::access::check_access;
use crate::model::entity::{
    LeaderboardEntry, LessonProgress, PointsHistoryEntry, ProgressPatch, ProgressUpsert,
    UnitCompletion,
};
use crate::model::error::{DatabaseError, DatabaseResult};

use super::ProgressTransport;

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";

/// PostgREST endpoint of the hosted database (`{url}/rest/v1`).
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnRow {
    column_name: String,
}

impl RestTransport {
    pub fn new(url: &str, anon_key: impl Into<String>) -> DatabaseResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("lasertutor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(session.access_token())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> DatabaseResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::error_for(status, &body))
    }

    fn error_for(status: StatusCode, body: &str) -> DatabaseError {
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return DatabaseError::Forbidden;
        }

        let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
        let known = parsed.as_ref().and_then(|e| {
            let code = e.code.as_deref()?;
            DatabaseError::from_sqlstate(code, e.message.as_deref().unwrap_or(body))
        });
        if let Some(known) = known {
            return known;
        }

        let message = parsed
            .and_then(|e| e.message)
            .unwrap_or_else(|| body.to_string());
        DatabaseError::RestError {
            status: status.as_u16(),
            message,
        }
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        session: &Session,
        name: &str,
        args: serde_json::Value,
    ) -> DatabaseResult<T> {
        let request = self
            .request(Method::POST, &format!("rpc/{name}"), session)
            .json(&args);
        self.send(request).await
    }
}

#[async_trait]
impl ProgressTransport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn fetch(&self, session: &Session, lesson_id: &str) -> DatabaseResult<Option<LessonProgress>> {
        let request = self.request(Method::GET, "lesson_progress", session).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.user_id())),
            ("lesson_id", format!("eq.{lesson_id}")),
        ]);

        let rows: Vec<LessonProgress> = self.send(request).await?;
        let row = rows.into_iter().next();
        if let Some(row) = &row {
            check_access(session, row)?;
        }
        Ok(row)
    }

    async fn fetch_all(&self, session: &Session) -> DatabaseResult<Vec<LessonProgress>> {
        let request = self.request(Method::GET, "lesson_progress", session).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.user_id())),
            ("order", "completed_at.desc.nullslast".to_string()),
        ]);

        let rows: Vec<LessonProgress> = self.send(request).await?;
        for row in &rows {
            check_access(session, row)?;
        }
        Ok(rows)
    }

    async fn upsert(
        &self,
        session: &Session,
        lesson_id: &str,
        patch: &ProgressPatch,
    ) -> DatabaseResult<LessonProgress> {
        let body = ProgressUpsert {
            user_id: session.user_id(),
            lesson_id,
            patch,
            updated_at: Utc::now(),
        };
        let request = self
            .request(Method::POST, "lesson_progress", session)
            .query(&[("on_conflict", "user_id,lesson_id")])
            .header("Prefer", UPSERT_PREFER)
            .json(&body);

        let rows: Vec<LessonProgress> = self.send(request).await?;
        rows.into_iter().next().ok_or_else(|| DatabaseError::RestError {
            status: StatusCode::OK.as_u16(),
            message: "upsert returned no representation".to_string(),
        })
    }

    async fn check_prerequisites(
        &self,
        session: &Session,
        lesson_id: &str,
        prerequisites: &[String],
    ) -> DatabaseResult<bool> {
        self.rpc(
            session,
            "check_lesson_prerequisites",
            json!({ "p_lesson_id": lesson_id, "p_prerequisites": prerequisites }),
        )
        .await
    }

    async fn process_unit_completion(&self, session: &Session, unit_id: &str) -> DatabaseResult<UnitCompletion> {
        self.rpc(
            session,
            "process_unit_completion",
            json!({ "p_user_id": session.user_id(), "p_unit_id": unit_id }),
        )
        .await
    }

    async fn table_columns(&self, session: &Session, table: &str) -> DatabaseResult<Vec<String>> {
        let rows: Vec<ColumnRow> = self
            .rpc(session, "get_table_columns", json!({ "table_name": table }))
            .await?;
        Ok(rows.into_iter().map(|r| r.column_name).collect())
    }

    async fn leaderboard(
        &self,
        session: &Session,
        category: &str,
        limit: i64,
    ) -> DatabaseResult<Vec<LeaderboardEntry>> {
        let request = self.request(Method::GET, "leaderboard_cache", session).query(&[
            ("select", "user_id,username,score,rank".to_string()),
            ("category", format!("eq.{category}")),
            ("order", "rank.asc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.send(request).await
    }

    async fn points_history(&self, session: &Session, limit: i64) -> DatabaseResult<Vec<PointsHistoryEntry>> {
        let request = self.request(Method::GET, "points_history", session).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", session.user_id())),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);

        let rows: Vec<PointsHistoryEntry> = self.send(request).await?;
        for row in &rows {
            check_access(session, row)?;
        }
        Ok(rows)
    }
}
