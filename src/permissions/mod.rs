// 权限推导模块
//
// 组织角色映射到静态权限集。仅用于客户端的界面判断，服务端才是权威

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 组织内角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Owner => "owner",
            OrgRole::Admin => "admin",
            OrgRole::Member => "member",
            OrgRole::Viewer => "viewer",
        }
    }

    /// 该角色的静态权限集
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            OrgRole::Owner => Permission::ALL,
            OrgRole::Admin => &[
                ViewDocuments,
                DownloadDocuments,
                UploadDocuments,
                EditDocuments,
                DeleteDocuments,
                ShareDocuments,
                Comment,
                ModerateComments,
                InviteMembers,
                ManageMembers,
                ManageOrganization,
            ],
            OrgRole::Member => &[
                ViewDocuments,
                DownloadDocuments,
                UploadDocuments,
                EditDocuments,
                Comment,
            ],
            OrgRole::Viewer => &[ViewDocuments, DownloadDocuments],
        }
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(OrgRole::Owner),
            "admin" => Ok(OrgRole::Admin),
            "member" => Ok(OrgRole::Member),
            "viewer" => Ok(OrgRole::Viewer),
            other => Err(format!("未知的组织角色: {}", other)),
        }
    }
}

/// 权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDocuments,
    DownloadDocuments,
    UploadDocuments,
    EditDocuments,
    DeleteDocuments,
    ShareDocuments,
    Comment,
    ModerateComments,
    InviteMembers,
    ManageMembers,
    ManageOrganization,
    DeleteOrganization,
    TransferOwnership,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::ViewDocuments,
        Permission::DownloadDocuments,
        Permission::UploadDocuments,
        Permission::EditDocuments,
        Permission::DeleteDocuments,
        Permission::ShareDocuments,
        Permission::Comment,
        Permission::ModerateComments,
        Permission::InviteMembers,
        Permission::ManageMembers,
        Permission::ManageOrganization,
        Permission::DeleteOrganization,
        Permission::TransferOwnership,
    ];
}

/// 当前用户在某个组织中的权限视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    role: Option<OrgRole>,
}

impl Permissions {
    pub fn new(role: Option<OrgRole>) -> Self {
        Self { role }
    }

    /// 从原始角色字符串构造，未知角色没有任何权限
    pub fn from_role_str(role: Option<&str>) -> Self {
        Self::new(role.and_then(|r| r.parse().ok()))
    }

    pub fn role(&self) -> Option<OrgRole> {
        self.role
    }

    pub fn granted(&self) -> &'static [Permission] {
        self.role.map(|r| r.permissions()).unwrap_or(&[])
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.granted().contains(&permission)
    }

    pub fn can_any(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.can(*p))
    }

    /// 空列表返回 true
    pub fn can_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.can(*p))
    }

    pub fn is_owner(&self) -> bool {
        self.role == Some(OrgRole::Owner)
    }

    pub fn is_admin_or_owner(&self) -> bool {
        matches!(self.role, Some(OrgRole::Owner) | Some(OrgRole::Admin))
    }

    /// 能否修改 / 移除持有 `target` 角色的成员
    ///
    /// owner 可以管理所有人；admin 只能管理 member 和 viewer
    pub fn can_manage_role(&self, target: OrgRole) -> bool {
        match self.role {
            Some(OrgRole::Owner) => true,
            Some(OrgRole::Admin) => matches!(target, OrgRole::Member | OrgRole::Viewer),
            _ => false,
        }
    }

    /// 能授予的角色
    pub fn assignable_roles(&self) -> Vec<OrgRole> {
        match self.role {
            Some(OrgRole::Owner) => vec![OrgRole::Admin, OrgRole::Member, OrgRole::Viewer],
            Some(OrgRole::Admin) => vec![OrgRole::Member, OrgRole::Viewer],
            _ => Vec::new(),
        }
    }
}
