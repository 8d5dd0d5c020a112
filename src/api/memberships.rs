// 组织与成员接口

use crate::api::client::decode;
use crate::api::normalize::normalize_memberships;
use crate::api::{ApiClient, ApiError, Membership, Organization};
use crate::permissions::OrgRole;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

/// 成员关系响应需要额外归一化角色字段
fn decode_memberships<T: serde::de::DeserializeOwned>(
    value: Value,
    keys: &[&str],
) -> Result<T, ApiError> {
    let mut inner = crate::api::normalize::unwrap_envelope(value, keys);
    normalize_memberships(&mut inner);
    decode(inner, &[])
}

impl ApiClient {
    /// 创建组织
    pub async fn create_organization(&self, name: &str) -> Result<Organization, ApiError> {
        let value = self
            .send_value(Method::POST, "/api/organizations", &json!({ "name": name.trim() }))
            .await?;
        let org: Organization = decode(value, &["organization"])?;
        info!("已创建组织: id={}, name={}", org.id, org.name);
        Ok(org)
    }

    /// 获取组织
    pub async fn get_organization(&self, id: &str) -> Result<Organization, ApiError> {
        let path = format!("/api/organizations/{}", urlencoding::encode(id));
        let value = self.get_value(&path, &[]).await?;
        decode(value, &["organization"])
    }

    /// 当前用户所属的全部组织（含角色）
    pub async fn my_memberships(&self) -> Result<Vec<Membership>, ApiError> {
        let value = self
            .get_value("/api/memberships/my-organizations", &[])
            .await?;
        decode_memberships(value, &["memberships"])
    }

    /// 组织成员列表
    pub async fn organization_members(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Membership>, ApiError> {
        let path = format!(
            "/api/memberships/organization/{}/members",
            urlencoding::encode(organization_id)
        );
        let value = self.get_value(&path, &[]).await?;
        decode_memberships(value, &["members"])
    }

    /// 邀请成员
    pub async fn invite_member(
        &self,
        organization_id: &str,
        email: &str,
        role: OrgRole,
    ) -> Result<Membership, ApiError> {
        let body = json!({
            "organizationId": organization_id,
            "email": email.trim(),
            "role": role.as_str(),
        });
        let value = self
            .send_value(Method::POST, "/api/memberships/invite", &body)
            .await?;
        info!(
            "已邀请成员: org={}, email={}, role={}",
            organization_id,
            email.trim(),
            role
        );
        decode_memberships(value, &["membership", "invitation"])
    }

    /// 待处理的邀请
    pub async fn pending_invitations(&self) -> Result<Vec<Membership>, ApiError> {
        let value = self
            .get_value("/api/memberships/invitations/pending", &[])
            .await?;
        decode_memberships(value, &["invitations"])
    }

    /// 接受邀请
    pub async fn accept_invitation(&self, membership_id: &str) -> Result<Membership, ApiError> {
        let path = format!(
            "/api/memberships/invitations/{}/accept",
            urlencoding::encode(membership_id)
        );
        let value = self.send_value(Method::POST, &path, &json!({})).await?;
        decode_memberships(value, &["membership"])
    }

    /// 拒绝邀请
    pub async fn reject_invitation(&self, membership_id: &str) -> Result<(), ApiError> {
        let path = format!(
            "/api/memberships/invitations/{}/reject",
            urlencoding::encode(membership_id)
        );
        self.send_value(Method::POST, &path, &json!({})).await?;
        Ok(())
    }

    /// 修改成员角色
    pub async fn change_member_role(
        &self,
        membership_id: &str,
        role: OrgRole,
    ) -> Result<Membership, ApiError> {
        let path = format!(
            "/api/memberships/{}/role",
            urlencoding::encode(membership_id)
        );
        let value = self
            .send_value(Method::PATCH, &path, &json!({ "role": role.as_str() }))
            .await?;
        decode_memberships(value, &["membership"])
    }

    /// 移除成员
    pub async fn remove_member(&self, membership_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/memberships/{}", urlencoding::encode(membership_id));
        self.send_value(Method::DELETE, &path, &json!({})).await?;
        Ok(())
    }

    /// 退出组织
    pub async fn leave_organization(&self, organization_id: &str) -> Result<(), ApiError> {
        let path = format!(
            "/api/memberships/organization/{}/leave",
            urlencoding::encode(organization_id)
        );
        self.send_value(Method::POST, &path, &json!({})).await?;
        Ok(())
    }
}
