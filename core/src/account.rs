//! Accounts and the combined account/folder tree

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AsgardError, AsgardResult};
use crate::folder::FolderDescriptor;
use crate::tree::OrderedTree;

/// Identity of a configured mail account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account ID
    pub id: Uuid,
    /// Email address
    pub email: String,
    /// Display name
    pub display_name: Option<String>,
}

impl AccountInfo {
    /// Create a new account with a fresh ID
    pub fn new(email: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            display_name,
        }
    }

    /// Display name, falling back to the email address
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }

    /// Validate the account
    pub fn validate(&self) -> AsgardResult<()> {
        let valid = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid {
            return Err(AsgardError::config(format!("invalid email address: {}", self.email)));
        }
        Ok(())
    }
}

impl std::fmt::Display for AccountInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// Node of the account forest shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// Top-level account entry
    Account(AccountInfo),
    /// Folder below an account
    Folder(FolderDescriptor),
}

impl TreeNode {
    pub fn as_account(&self) -> Option<&AccountInfo> {
        match self {
            TreeNode::Account(info) => Some(info),
            TreeNode::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderDescriptor> {
        match self {
            TreeNode::Account(_) => None,
            TreeNode::Folder(folder) => Some(folder),
        }
    }
}

impl std::fmt::Display for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeNode::Account(info) => write!(f, "{}", info.display_name()),
            TreeNode::Folder(folder) => write!(f, "{}", folder.name),
        }
    }
}

/// One root per account, with that account's folder tree beneath it
///
/// Accounts without a published folder tree appear as bare roots.
pub fn build_account_forest<'a>(
    accounts: impl IntoIterator<Item = (&'a AccountInfo, Option<&'a OrderedTree<FolderDescriptor>>)>,
) -> AsgardResult<OrderedTree<TreeNode>> {
    let mut forest = OrderedTree::new();
    for (info, folders) in accounts {
        let root = TreeNode::Account(info.clone());
        forest.add(root.clone());
        if let Some(folders) = folders {
            forest.add_subtree(folders.map(|f| TreeNode::Folder(f.clone())), &root)?;
        }
    }
    Ok(forest)
}

/// Account owning `folder` in a forest built by [`build_account_forest`]
///
/// When several accounts hold a folder with the same path, the first
/// account in the forest wins.
pub fn owning_account<'a>(forest: &'a OrderedTree<TreeNode>, folder: &FolderDescriptor) -> Option<&'a AccountInfo> {
    forest
        .path_to(&TreeNode::Folder(folder.clone()))?
        .first()
        .and_then(|node| node.as_account())
}
