//! Sync manager owning every account session

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::account::{build_account_forest, AccountInfo, TreeNode};
use crate::config::SyncConfig;
use crate::error::{AsgardError, AsgardResult};
use crate::notify::NotificationSink;
use crate::storage::MessageList;
use crate::store::MailStore;
use crate::sync::AccountSession;
use crate::tree::OrderedTree;

/// Explicitly constructed context holding the account collection
///
/// Accounts keep the order in which they were added.
pub struct SyncManager {
    config: SyncConfig,
    sink: Arc<dyn NotificationSink>,
    accounts: RwLock<IndexMap<Uuid, Arc<AccountSession>>>,
}

impl SyncManager {
    /// Create a new sync manager
    pub fn new(config: SyncConfig, sink: Arc<dyn NotificationSink>) -> AsgardResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            accounts: RwLock::new(IndexMap::new()),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Add an account and start syncing it
    pub async fn add_account(&self, info: AccountInfo, store: Arc<dyn MailStore>) -> AsgardResult<Arc<AccountSession>> {
        info.validate()?;
        let account_id = info.id;

        let session = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&account_id) {
                return Err(AsgardError::invalid_state(format!("account {} already added", account_id)));
            }
            let session = Arc::new(AccountSession::new(info, self.config.clone(), store, self.sink.clone()));
            accounts.insert(account_id, session.clone());
            session
        };

        session.start().await?;
        info!("Added account for syncing: {}", account_id);
        Ok(session)
    }

    /// Stop and drop an account
    pub async fn remove_account(&self, account_id: Uuid) -> AsgardResult<()> {
        let session = self
            .accounts
            .write()
            .await
            .shift_remove(&account_id)
            .ok_or_else(|| AsgardError::not_found(format!("account {}", account_id)))?;

        session.shutdown().await;
        info!("Removed account from syncing: {}", account_id);
        Ok(())
    }

    /// Session of one account
    pub async fn account(&self, account_id: Uuid) -> Option<Arc<AccountSession>> {
        self.accounts.read().await.get(&account_id).cloned()
    }

    /// All sessions, in insertion order
    pub async fn accounts(&self) -> Vec<Arc<AccountSession>> {
        self.accounts.read().await.values().cloned().collect()
    }

    /// Message list of a folder in one account
    pub async fn folder_content(&self, account_id: Uuid, folder_path: &str) -> AsgardResult<MessageList> {
        let session = self
            .account(account_id)
            .await
            .ok_or_else(|| AsgardError::not_found(format!("account {}", account_id)))?;
        Ok(session.folder_content(folder_path))
    }

    /// Every account with its current folder tree beneath it
    pub async fn account_forest(&self) -> AsgardResult<OrderedTree<TreeNode>> {
        let sessions = self.accounts().await;
        let trees: Vec<_> = sessions.iter().map(|s| (s.info().clone(), s.folder_tree())).collect();
        build_account_forest(trees.iter().map(|(info, tree)| (info, tree.as_ref())))
    }

    /// Stop every account
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.accounts.write().await.drain(..).map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown().await;
        }
        info!("Sync manager stopped");
    }
}
