//! Group conversation operations
//!
//! Creating and updating groups, membership management, join requests,
//! pinned messages, and group messaging. Group endpoints live under the
//! older `/v2.0/oa` prefix.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::{ApiRequest, RequestExecutor};
use crate::error::{Error, Result};
use crate::utils::sanitize_message;

const GROUP_CREATE: &str = "/v2.0/oa/group/create";
const GROUP_INFO: &str = "/v2.0/oa/group/getinfo";
const GROUP_LIST: &str = "/v2.0/oa/group/getlist";
const GROUP_MEMBERS: &str = "/v2.0/oa/group/getmembers";
const GROUP_ADD_MEMBER: &str = "/v2.0/oa/group/addmember";
const GROUP_REMOVE_MEMBER: &str = "/v2.0/oa/group/removemember";
const GROUP_LEAVE: &str = "/v2.0/oa/group/leave";
const GROUP_UPDATE: &str = "/v2.0/oa/group/update";
const GROUP_ADD_ADMIN: &str = "/v2.0/oa/group/addadmin";
const GROUP_REMOVE_ADMIN: &str = "/v2.0/oa/group/removeadmin";
const GROUP_MESSAGE: &str = "/v2.0/oa/group/message";
const GROUP_PENDING: &str = "/v2.0/oa/group/getpendingrequests";
const GROUP_APPROVE: &str = "/v2.0/oa/group/approverequest";
const GROUP_REJECT: &str = "/v2.0/oa/group/rejectrequest";
const GROUP_PIN: &str = "/v2.0/oa/group/pinmessage";
const GROUP_UNPIN: &str = "/v2.0/oa/group/unpinmessage";

/// Groups are served at most twenty per page
pub const GROUP_PAGE_SIZE: i64 = 20;

const MAX_NAME_LENGTH: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 500;

/// A member's role within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    /// Group creator
    Owner,
    /// Administrator
    Admin,
    /// Regular member
    Member,
}

/// A group member
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupMember {
    /// Platform user id
    #[serde(default)]
    pub user_id: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Raw role value; the platform reports either strings or codes
    #[serde(default)]
    pub role: serde_json::Value,
    /// When the member joined, as a platform timestamp
    #[serde(default)]
    pub joined_at: Option<i64>,
}

impl GroupMember {
    /// Role decoded from the platform's mixed string/code representation
    #[must_use]
    pub fn group_role(&self) -> GroupRole {
        let raw = match &self.role {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return GroupRole::Member,
        };

        match raw.as_str() {
            "owner" | "-1" => GroupRole::Owner,
            "admin" | "0" => GroupRole::Admin,
            _ => GroupRole::Member,
        }
    }
}

/// A group
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Group {
    /// Platform group id
    #[serde(default, alias = "id")]
    pub group_id: String,
    /// Group name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Member count
    #[serde(default, alias = "total_member")]
    pub member_count: i64,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Whether the official account administers this group
    #[serde(default)]
    pub is_admin: bool,
    /// Admin user ids
    #[serde(default)]
    pub admins: Vec<String>,
}

/// One page of groups
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupPage {
    /// Groups on this page
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Total group count reported by the platform
    #[serde(default)]
    pub total: i64,
}

/// One page of group members
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupMemberPage {
    /// Members on this page
    #[serde(default)]
    pub members: Vec<GroupMember>,
    /// Total member count reported by the platform
    #[serde(default)]
    pub total: i64,
}

/// Group endpoints
pub struct GroupsApi {
    executor: Arc<RequestExecutor>,
}

impl GroupsApi {
    /// Create the groups API surface
    #[must_use]
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Create a group with at least two initial members
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty name or fewer than two members;
    /// otherwise the executor's classification
    pub async fn create(
        &self,
        name: &str,
        member_ids: &[String],
        description: Option<&str>,
    ) -> Result<Group> {
        require_non_empty(name, "name")?;
        if member_ids.len() < 2 {
            return Err(Error::Validation("at least 2 members are required".into()));
        }

        let mut payload = json!({
            "name": sanitize_message(name, MAX_NAME_LENGTH),
            "member_ids": member_ids,
        });
        if let Some(description) = description {
            payload["description"] = json!(sanitize_message(description, MAX_DESCRIPTION_LENGTH));
        }

        let response =
            self.executor.execute(ApiRequest::post(GROUP_CREATE).with_body(payload)).await?;
        response.data_as()
    }

    /// Get group information
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn info(&self, group_id: &str) -> Result<Group> {
        require_non_empty(group_id, "group_id")?;

        let response = self
            .executor
            .execute(ApiRequest::get(GROUP_INFO).with_query("group_id", group_id))
            .await?;
        response.data_as()
    }

    /// Get one page of groups
    ///
    /// # Errors
    /// Returns the executor's classification on failure
    pub async fn list(&self, offset: i64, count: i64) -> Result<GroupPage> {
        let response = self
            .executor
            .execute(
                ApiRequest::get(GROUP_LIST)
                    .with_query("offset", offset.to_string())
                    .with_query("count", count.to_string()),
            )
            .await?;
        response.data_as()
    }

    /// Get every group, paging automatically
    ///
    /// # Errors
    /// Returns the executor's classification on the first failing page
    pub async fn all(&self) -> Result<Vec<Group>> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.list(offset, GROUP_PAGE_SIZE).await?;
            let fetched = page.groups.len() as i64;
            all.extend(page.groups);

            if fetched < GROUP_PAGE_SIZE {
                break;
            }
            offset += GROUP_PAGE_SIZE;
        }

        debug!(total = all.len(), "fetched all groups");
        Ok(all)
    }

    /// Get one page of group members
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn members(
        &self,
        group_id: &str,
        offset: i64,
        count: i64,
    ) -> Result<GroupMemberPage> {
        require_non_empty(group_id, "group_id")?;

        let response = self
            .executor
            .execute(
                ApiRequest::get(GROUP_MEMBERS)
                    .with_query("group_id", group_id)
                    .with_query("offset", offset.to_string())
                    .with_query("count", count.to_string()),
            )
            .await?;
        response.data_as()
    }

    /// Add members to a group
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn add_members(&self, group_id: &str, member_ids: &[String]) -> Result<()> {
        require_non_empty(group_id, "group_id")?;
        if member_ids.is_empty() {
            return Err(Error::Validation("member_ids is required".into()));
        }

        self.executor
            .execute(
                ApiRequest::post(GROUP_ADD_MEMBER)
                    .with_body(json!({ "group_id": group_id, "member_ids": member_ids })),
            )
            .await?;
        Ok(())
    }

    /// Remove a member from a group
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn remove_member(&self, group_id: &str, member_id: &str) -> Result<()> {
        require_non_empty(group_id, "group_id")?;
        require_non_empty(member_id, "member_id")?;

        self.executor
            .execute(
                ApiRequest::post(GROUP_REMOVE_MEMBER)
                    .with_body(json!({ "group_id": group_id, "member_id": member_id })),
            )
            .await?;
        Ok(())
    }

    /// Leave a group
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn leave(&self, group_id: &str) -> Result<()> {
        require_non_empty(group_id, "group_id")?;

        self.executor
            .execute(ApiRequest::post(GROUP_LEAVE).with_body(json!({ "group_id": group_id })))
            .await?;
        Ok(())
    }

    /// Update group name, description, or avatar
    ///
    /// Only the provided fields are sent.
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn update(
        &self,
        group_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        require_non_empty(group_id, "group_id")?;

        let mut payload = json!({ "group_id": group_id });
        if let Some(name) = name {
            payload["name"] = json!(sanitize_message(name, MAX_NAME_LENGTH));
        }
        if let Some(description) = description {
            payload["description"] = json!(sanitize_message(description, MAX_DESCRIPTION_LENGTH));
        }
        if let Some(avatar) = avatar_url {
            payload["avatar"] = json!(avatar);
        }

        self.executor.execute(ApiRequest::post(GROUP_UPDATE).with_body(payload)).await?;
        Ok(())
    }

    /// Grant or revoke a member's admin role
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn set_admin(&self, group_id: &str, member_id: &str, is_admin: bool) -> Result<()> {
        require_non_empty(group_id, "group_id")?;
        require_non_empty(member_id, "member_id")?;

        let endpoint = if is_admin { GROUP_ADD_ADMIN } else { GROUP_REMOVE_ADMIN };
        self.executor
            .execute(
                ApiRequest::post(endpoint)
                    .with_body(json!({ "group_id": group_id, "member_id": member_id })),
            )
            .await?;
        Ok(())
    }

    /// Send a text message to a group
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_message(&self, group_id: &str, text: &str) -> Result<serde_json::Value> {
        require_non_empty(group_id, "group_id")?;
        require_non_empty(text, "text")?;

        let response = self
            .executor
            .execute(ApiRequest::post(GROUP_MESSAGE).with_body(json!({
                "group_id": group_id,
                "message": { "text": sanitize_message(text, crate::utils::MAX_MESSAGE_LENGTH) },
            })))
            .await?;
        Ok(response.data)
    }

    /// List pending join requests
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn pending_requests(&self, group_id: &str) -> Result<Vec<serde_json::Value>> {
        require_non_empty(group_id, "group_id")?;

        let response = self
            .executor
            .execute(ApiRequest::get(GROUP_PENDING).with_query("group_id", group_id))
            .await?;
        Ok(response
            .data
            .get("requests")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Approve a join request
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn approve_request(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.resolve_request(GROUP_APPROVE, group_id, user_id).await
    }

    /// Reject a join request
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn reject_request(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.resolve_request(GROUP_REJECT, group_id, user_id).await
    }

    /// Pin a message in a group
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn pin_message(&self, group_id: &str, message_id: &str) -> Result<()> {
        self.toggle_pin(GROUP_PIN, group_id, message_id).await
    }

    /// Unpin a message in a group
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn unpin_message(&self, group_id: &str, message_id: &str) -> Result<()> {
        self.toggle_pin(GROUP_UNPIN, group_id, message_id).await
    }

    async fn resolve_request(&self, endpoint: &str, group_id: &str, user_id: &str) -> Result<()> {
        require_non_empty(group_id, "group_id")?;
        require_non_empty(user_id, "user_id")?;

        self.executor
            .execute(
                ApiRequest::post(endpoint)
                    .with_body(json!({ "group_id": group_id, "user_id": user_id })),
            )
            .await?;
        Ok(())
    }

    async fn toggle_pin(&self, endpoint: &str, group_id: &str, message_id: &str) -> Result<()> {
        require_non_empty(group_id, "group_id")?;
        require_non_empty(message_id, "message_id")?;

        self.executor
            .execute(
                ApiRequest::post(endpoint)
                    .with_body(json!({ "group_id": group_id, "message_id": message_id })),
            )
            .await?;
        Ok(())
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::TokenManager;
    use crate::config::AppConfig;
    use crate::testing::MockOAuthApi;

    async fn groups_for(server: &MockServer) -> GroupsApi {
        let config = AppConfig::new("test-app", "test-secret")
            .unwrap()
            .with_api_base_url(server.uri());

        let tokens = Arc::new(TokenManager::new(Arc::new(MockOAuthApi::new()), None, 60));
        tokens.set_access_token("valid-token", None).await.unwrap();

        GroupsApi::new(Arc::new(RequestExecutor::new(&config, tokens).unwrap()))
    }

    #[tokio::test]
    async fn create_requires_two_members() {
        let server = MockServer::start().await;
        let groups = groups_for(&server).await;

        let result = groups.create("team", &["only-one".to_string()], None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_posts_sanitized_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GROUP_CREATE))
            .and(body_partial_json(serde_json::json!({ "name": "project team" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": 0,
                "data": { "group_id": "g-1", "name": "project team", "total_member": 3 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let groups = groups_for(&server).await;
        let members = vec!["u-1".to_string(), "u-2".to_string()];
        let group = groups.create("project   team", &members, None).await.unwrap();

        assert_eq!(group.group_id, "g-1");
        assert_eq!(group.member_count, 3);
    }

    #[tokio::test]
    async fn info_accepts_id_alias() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(GROUP_INFO))
            .and(query_param("group_id", "g-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": 0,
                "data": { "id": "g-1", "name": "team", "is_admin": true },
            })))
            .mount(&server)
            .await;

        let groups = groups_for(&server).await;
        let group = groups.info("g-1").await.unwrap();

        assert_eq!(group.group_id, "g-1");
        assert!(group.is_admin);
    }

    #[tokio::test]
    async fn all_pages_until_a_short_page() {
        let server = MockServer::start().await;

        let full: Vec<serde_json::Value> = (0..20)
            .map(|i| serde_json::json!({ "group_id": format!("g-{i}"), "name": "g" }))
            .collect();
        Mock::given(method("GET"))
            .and(path(GROUP_LIST))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": 0,
                "data": { "groups": full, "total": 21 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(GROUP_LIST))
            .and(query_param("offset", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": 0,
                "data": { "groups": [{ "group_id": "g-20", "name": "last" }], "total": 21 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let groups = groups_for(&server).await;
        let all = groups.all().await.unwrap();

        assert_eq!(all.len(), 21);
        assert_eq!(all[20].group_id, "g-20");
    }

    #[tokio::test]
    async fn member_roles_decode_from_mixed_representations() {
        let owner = GroupMember { role: serde_json::json!("owner"), ..Default::default() };
        let owner_code = GroupMember { role: serde_json::json!("-1"), ..Default::default() };
        let admin_code = GroupMember { role: serde_json::json!(0), ..Default::default() };
        let member = GroupMember { role: serde_json::json!(1), ..Default::default() };
        let missing = GroupMember::default();

        assert_eq!(owner.group_role(), GroupRole::Owner);
        assert_eq!(owner_code.group_role(), GroupRole::Owner);
        assert_eq!(admin_code.group_role(), GroupRole::Admin);
        assert_eq!(member.group_role(), GroupRole::Member);
        assert_eq!(missing.group_role(), GroupRole::Member);
    }

    #[tokio::test]
    async fn set_admin_picks_endpoint_by_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GROUP_ADD_ADMIN))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": 0})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GROUP_REMOVE_ADMIN))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let groups = groups_for(&server).await;
        groups.set_admin("g-1", "u-1", true).await.unwrap();
        groups.set_admin("g-1", "u-1", false).await.unwrap();
    }
}
