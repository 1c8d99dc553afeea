//! Contact and follower operations
//!
//! Profiles, follower listing with pagination, tag management, notes,
//! conversations, and follow requests.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::{ApiRequest, RequestExecutor};
use crate::error::{Error, Result};
use crate::utils::validate_phone;

const USER_DETAIL: &str = "/v3.0/oa/user/detail";
const FOLLOWER_LIST: &str = "/v3.0/oa/follower/getlist";
const CONVERSATION_LIST: &str = "/v3.0/oa/conversation/list";
const CONVERSATION: &str = "/v3.0/oa/conversation";
const TAG_ASSIGN: &str = "/v3.0/oa/tag/tagfollower";
const TAG_REMOVE: &str = "/v3.0/oa/tag/rmfollowerfromtag";
const TAG_LIST: &str = "/v3.0/oa/tag/getlist";
const TAG_CREATE: &str = "/v3.0/oa/tag/create";
const TAG_DELETE: &str = "/v3.0/oa/tag/delete";
const NOTE_UPDATE: &str = "/v3.0/oa/tag/updatenote";
const FOLLOW_REQUEST: &str = "/v3.0/oa/follow/request";

/// Followers are served at most fifty per page
pub const FOLLOWER_PAGE_SIZE: i64 = 50;

/// User gender as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    /// Male (platform code 1)
    Male,
    /// Female (platform code 2)
    Female,
    /// Other (platform code 0)
    Other,
    /// Not reported
    Unknown,
}

impl Gender {
    fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::Male,
            Some(2) => Self::Female,
            Some(0) => Self::Other,
            _ => Self::Unknown,
        }
    }
}

/// Tag and note metadata attached to a profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsAndNotes {
    /// Tag names assigned to the user
    #[serde(default)]
    pub tag_names: Vec<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// A user profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    /// Platform user id
    #[serde(default)]
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Gender code as reported by the platform
    #[serde(default)]
    pub user_gender: Option<i64>,
    /// Birthday string as reported by the platform
    #[serde(default)]
    pub birthday: Option<String>,
    /// Phone number, when shared
    #[serde(default)]
    pub phone: Option<String>,
    /// Whether the user follows the official account
    #[serde(default)]
    pub is_follower: bool,
    /// Tags and notes attached to the user
    #[serde(default)]
    pub tags_and_notes_info: TagsAndNotes,
    /// Additional info shared by the user
    #[serde(default)]
    pub shared_info: serde_json::Value,
}

impl UserProfile {
    /// Gender decoded from the platform code
    #[must_use]
    pub fn gender(&self) -> Gender {
        Gender::from_code(self.user_gender)
    }
}

/// A follower entry from the follower list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowerInfo {
    /// Platform user id
    #[serde(default)]
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// When the user followed, as a platform timestamp
    #[serde(default)]
    pub followed_at: Option<i64>,
}

/// One page of followers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowerPage {
    /// Followers on this page
    #[serde(default)]
    pub followers: Vec<FollowerInfo>,
    /// Total follower count reported by the platform
    #[serde(default)]
    pub total: i64,
}

/// Contact endpoints
pub struct ContactsApi {
    executor: Arc<RequestExecutor>,
}

impl ContactsApi {
    /// Create the contacts API surface
    #[must_use]
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Get a user profile
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        require_non_empty(user_id, "user_id")?;

        let response = self
            .executor
            .execute(ApiRequest::get(USER_DETAIL).with_query("user_id", user_id))
            .await?;
        response.data_as()
    }

    /// Get one page of followers
    ///
    /// `count` is capped at [`FOLLOWER_PAGE_SIZE`].
    ///
    /// # Errors
    /// Returns the executor's classification on failure
    pub async fn followers(
        &self,
        offset: i64,
        count: i64,
        tag_name: Option<&str>,
    ) -> Result<FollowerPage> {
        let count = count.min(FOLLOWER_PAGE_SIZE);

        let mut request = ApiRequest::get(FOLLOWER_LIST)
            .with_query("offset", offset.to_string())
            .with_query("count", count.to_string());
        if let Some(tag) = tag_name {
            request = request.with_query("tag_name", tag);
        }

        let response = self.executor.execute(request).await?;
        response.data_as()
    }

    /// Get every follower, paging automatically
    ///
    /// # Errors
    /// Returns the executor's classification on the first failing page
    pub async fn all_followers(&self, tag_name: Option<&str>) -> Result<Vec<FollowerInfo>> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.followers(offset, FOLLOWER_PAGE_SIZE, tag_name).await?;
            let fetched = page.followers.len() as i64;
            all.extend(page.followers);

            if fetched < FOLLOWER_PAGE_SIZE {
                break;
            }
            offset += FOLLOWER_PAGE_SIZE;
        }

        debug!(total = all.len(), "fetched all followers");
        Ok(all)
    }

    /// Get recent conversations
    ///
    /// # Errors
    /// Returns the executor's classification on failure
    pub async fn recent_conversations(
        &self,
        offset: i64,
        count: i64,
    ) -> Result<serde_json::Value> {
        let response = self
            .executor
            .execute(
                ApiRequest::get(CONVERSATION_LIST)
                    .with_query("offset", offset.to_string())
                    .with_query("count", count.to_string()),
            )
            .await?;
        Ok(response.data)
    }

    /// Get conversation history with a user
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn conversation(
        &self,
        user_id: &str,
        offset: i64,
        count: i64,
    ) -> Result<serde_json::Value> {
        require_non_empty(user_id, "user_id")?;

        let response = self
            .executor
            .execute(
                ApiRequest::get(CONVERSATION)
                    .with_query("user_id", user_id)
                    .with_query("offset", offset.to_string())
                    .with_query("count", count.to_string()),
            )
            .await?;
        Ok(response.data)
    }

    /// Assign a tag to a user
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn assign_tag(&self, user_id: &str, tag_name: &str) -> Result<()> {
        require_non_empty(user_id, "user_id")?;
        require_non_empty(tag_name, "tag_name")?;

        self.executor
            .execute(
                ApiRequest::post(TAG_ASSIGN)
                    .with_body(json!({ "user_id": user_id, "tag_name": tag_name })),
            )
            .await?;
        Ok(())
    }

    /// Remove a tag from a user
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn remove_tag(&self, user_id: &str, tag_name: &str) -> Result<()> {
        require_non_empty(user_id, "user_id")?;
        require_non_empty(tag_name, "tag_name")?;

        self.executor
            .execute(
                ApiRequest::post(TAG_REMOVE)
                    .with_body(json!({ "user_id": user_id, "tag_name": tag_name })),
            )
            .await?;
        Ok(())
    }

    /// List all tags
    ///
    /// # Errors
    /// Returns the executor's classification on failure
    pub async fn tags(&self) -> Result<Vec<serde_json::Value>> {
        let response = self.executor.execute(ApiRequest::get(TAG_LIST)).await?;
        Ok(response
            .data
            .get("tags")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Create a tag
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty name; otherwise the executor's
    /// classification
    pub async fn create_tag(&self, tag_name: &str) -> Result<()> {
        require_non_empty(tag_name, "tag_name")?;

        self.executor
            .execute(ApiRequest::post(TAG_CREATE).with_body(json!({ "tag_name": tag_name })))
            .await?;
        Ok(())
    }

    /// Delete a tag
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty name; otherwise the executor's
    /// classification
    pub async fn delete_tag(&self, tag_name: &str) -> Result<()> {
        require_non_empty(tag_name, "tag_name")?;

        self.executor
            .execute(ApiRequest::post(TAG_DELETE).with_body(json!({ "tag_name": tag_name })))
            .await?;
        Ok(())
    }

    /// Update the notes attached to a user
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn update_notes(&self, user_id: &str, notes: &str) -> Result<()> {
        require_non_empty(user_id, "user_id")?;

        self.executor
            .execute(
                ApiRequest::post(NOTE_UPDATE)
                    .with_body(json!({ "user_id": user_id, "note": notes })),
            )
            .await?;
        Ok(())
    }

    /// Send a follow request to a phone number
    ///
    /// # Errors
    /// [`Error::Validation`] for a malformed phone number; otherwise the
    /// executor's classification
    pub async fn follow_request(&self, phone: &str) -> Result<serde_json::Value> {
        if !validate_phone(phone) {
            return Err(Error::Validation("invalid phone number format".into()));
        }

        let response = self
            .executor
            .execute(ApiRequest::post(FOLLOW_REQUEST).with_body(json!({ "phone": phone })))
            .await?;
        Ok(response.data)
    }

    /// Check whether a user is currently active, per their shared info
    ///
    /// Users who don't share activity info read as inactive.
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn is_user_active(&self, user_id: &str) -> Result<bool> {
        let profile = self.profile(user_id).await?;
        Ok(profile
            .shared_info
            .get("is_active")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(())
}
