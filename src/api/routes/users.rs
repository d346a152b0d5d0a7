use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::{is_valid_username, Tick, UserActivityRecord, UserRef};

/// Ticks shown per user unless `latest` says otherwise.
const DEFAULT_LATEST: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub user_id: String,
    pub total_ticks: usize,
    pub last_refresh_time: DateTime<Utc>,
    pub last_tick_date: Option<String>,
}

impl From<&UserActivityRecord> for UserSummary {
    fn from(record: &UserActivityRecord) -> Self {
        Self {
            username: record.username.clone(),
            user_id: record.user_id.clone(),
            total_ticks: record.total_ticks,
            last_refresh_time: record.last_refresh_time,
            last_tick_date: record.last_tick_date().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub latest_ticks: Vec<Tick>,
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub latest: Option<usize>,
}

/// Either a profile URL or an explicit id and username.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub url: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl AddUserRequest {
    fn user_ref(&self) -> Result<UserRef, ApiError> {
        if let Some(url) = &self.url {
            return UserRef::from_profile_url(url)
                .ok_or_else(|| ApiError::BadRequest(format!("Not a user profile URL: {}", url)));
        }

        match (self.user_id.as_deref(), self.username.as_deref()) {
            (Some(id), Some(name))
                if !id.trim().is_empty()
                    && is_valid_username(name.trim())
                    && id.trim().chars().all(|c| c.is_ascii_digit()) =>
            {
                Ok(UserRef::new(id.trim(), name.trim()))
            }
            _ => Err(ApiError::BadRequest(
                "Provide either url or a numeric userId and a valid username".to_string(),
            )),
        }
    }
}

pub async fn list_users(State(state): State<AppState>) -> Json<Vec<UserSummary>> {
    let store = state.store.read().await;
    Json(store.records().map(UserSummary::from).collect())
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<UserParams>,
) -> Result<Json<UserDetail>, ApiError> {
    let store = state.store.read().await;
    let record = store
        .get(&username)
        .ok_or_else(|| ApiError::NotFound(format!("User {}", username)))?;

    Ok(Json(UserDetail {
        summary: UserSummary::from(&**record),
        latest_ticks: record
            .latest(params.latest.unwrap_or(DEFAULT_LATEST))
            .to_vec(),
    }))
}

pub async fn add_user(
    State(state): State<AppState>,
    Json(request): Json<AddUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = request.user_ref()?;
    let result = state.refresher.refresh_user(user).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.refresher.remove_user(&username).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("User {}", username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::api::routes::test_support::{delete, get_json, post_json, record, setup_state};
    use crate::fetch::StaticTickSource;
    use chrono::Days;

    fn recent(route: &str) -> Tick {
        let day = Utc::now().date_naive().checked_sub_days(Days::new(2)).unwrap();
        Tick::new(day.format("%Y-%m-%d").to_string(), route).with_rating("5.11a")
    }

    #[test]
    fn test_add_user_request_from_url() {
        let request = AddUserRequest {
            url: Some("https://www.mountainproject.com/user/123/some-one".to_string()),
            user_id: None,
            username: None,
        };
        assert_eq!(request.user_ref().unwrap(), UserRef::new("123", "some-one"));
    }

    #[test]
    fn test_add_user_request_rejects_bad_input() {
        let no_fields = AddUserRequest {
            url: None,
            user_id: None,
            username: None,
        };
        assert!(no_fields.user_ref().is_err());

        let bad_id = AddUserRequest {
            url: None,
            user_id: Some("abc".to_string()),
            username: Some("x".to_string()),
        };
        assert!(bad_id.user_ref().is_err());

        let bad_url = AddUserRequest {
            url: Some("https://example.com/area/1".to_string()),
            user_id: None,
            username: None,
        };
        assert!(bad_url.user_ref().is_err());

        let traversal = AddUserRequest {
            url: None,
            user_id: Some("1".to_string()),
            username: Some("../x".to_string()),
        };
        assert!(traversal.user_ref().is_err());
    }

    #[tokio::test]
    async fn test_list_users_in_insertion_order() {
        let state = setup_state(
            vec![
                record("zed", vec![recent("A")]),
                record("amy", Vec::new()),
            ],
            StaticTickSource::new(),
        );

        let (status, json) = get_json(build_router(state), "/api/users").await;
        assert_eq!(status, StatusCode::OK);
        let users = json.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["username"], "zed");
        assert_eq!(users[0]["totalTicks"], 1);
        assert_eq!(users[1]["username"], "amy");
        assert!(users[1]["lastTickDate"].is_null());
    }

    #[tokio::test]
    async fn test_get_user_latest_ticks() {
        let ticks = (0..15).map(|i| recent(&format!("Route {}", i))).collect();
        let state = setup_state(vec![record("alex", ticks)], StaticTickSource::new());
        let app = build_router(state);

        let (status, json) = get_json(app.clone(), "/api/users/alex").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalTicks"], 15);
        assert_eq!(json["latestTicks"].as_array().unwrap().len(), 10);

        let (_, json) = get_json(app, "/api/users/alex?latest=3").await;
        assert_eq!(json["latestTicks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_unknown_user_is_404() {
        let state = setup_state(Vec::new(), StaticTickSource::new());

        let (status, json) = get_json(build_router(state), "/api/users/nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_add_user_downloads_ticks() {
        let source = StaticTickSource::new().with_user("crag-cat", vec![recent("Crack")]);
        let state = setup_state(Vec::new(), source);
        let store = state.store.clone();

        let (status, json) = post_json(
            build_router(state),
            "/api/users",
            r#"{"url":"https://www.mountainproject.com/user/42/crag-cat"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["username"], "crag-cat");
        assert_eq!(json["tickCount"], 1);
        assert_eq!(store.read().await.get("crag-cat").unwrap().user_id, "42");
    }

    #[tokio::test]
    async fn test_add_user_fetch_failure_is_502() {
        let state = setup_state(Vec::new(), StaticTickSource::new());
        let store = state.store.clone();

        let (status, json) = post_json(
            build_router(state),
            "/api/users",
            r#"{"userId":"7","username":"ghost"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "UPSTREAM_ERROR");
        assert!(store.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_private_user_reports_access_denied() {
        let source = StaticTickSource::new()
            .with_export("hidden", "<!DOCTYPE html><html><title>Log in</title></html>");
        let state = setup_state(Vec::new(), source);

        let (status, json) = post_json(
            build_router(state),
            "/api/users",
            r#"{"userId":"8","username":"hidden"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "UPSTREAM_ACCESS_DENIED");
    }

    #[tokio::test]
    async fn test_add_user_bad_request() {
        let state = setup_state(Vec::new(), StaticTickSource::new());

        let (status, _) = post_json(build_router(state), "/api/users", r#"{"username":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let state = setup_state(vec![record("alex", vec![recent("A")])], StaticTickSource::new());
        let app = build_router(state);

        let (status, _) = delete(app.clone(), "/api/users/alex").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = delete(app, "/api/users/alex").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
