use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{Identity, Member};
use crate::services::ServiceError;

/// Read/write access to member accounts.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find(&self, identity: &Identity) -> Result<Option<Member>, ServiceError>;
    async fn find_by_login(&self, login_id: &str) -> Result<Option<Member>, ServiceError>;
    async fn find_by_register_token(&self, token: &str) -> Result<Option<Member>, ServiceError>;
    /// Insert a new member. Fails with `ValidationError` when the identity
    /// or login id is taken.
    async fn create(&self, member: &Member) -> Result<(), ServiceError>;
    /// Mark registration as complete by clearing the register token.
    async fn finish_registration(&self, identity: &Identity) -> Result<(), ServiceError>;
}

#[derive(Default)]
pub struct MemoryMemberDirectory {
    members: Mutex<HashMap<Identity, Member>>,
}

impl MemoryMemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member; test seeding helper.
    pub fn upsert(&self, member: Member) -> Result<(), ServiceError> {
        self.members
            .lock()
            .map_err(|e| anyhow::anyhow!("Member directory mutex poisoned: {}", e))?
            .insert(member.identity.clone(), member);
        Ok(())
    }

    fn find_where(
        &self,
        pred: impl Fn(&Member) -> bool,
    ) -> Result<Option<Member>, ServiceError> {
        let members = self
            .members
            .lock()
            .map_err(|e| anyhow::anyhow!("Member directory mutex poisoned: {}", e))?;
        Ok(members.values().find(|m| pred(m)).cloned())
    }
}

#[async_trait]
impl MemberDirectory for MemoryMemberDirectory {
    async fn find(&self, identity: &Identity) -> Result<Option<Member>, ServiceError> {
        let member = self
            .members
            .lock()
            .map_err(|e| anyhow::anyhow!("Member directory mutex poisoned: {}", e))?
            .get(identity)
            .cloned();
        Ok(member)
    }

    async fn find_by_login(&self, login_id: &str) -> Result<Option<Member>, ServiceError> {
        self.find_where(|m| m.login_id.as_deref() == Some(login_id))
    }

    async fn find_by_register_token(&self, token: &str) -> Result<Option<Member>, ServiceError> {
        self.find_where(|m| m.register_token.as_deref() == Some(token))
    }

    async fn create(&self, member: &Member) -> Result<(), ServiceError> {
        let mut members = self
            .members
            .lock()
            .map_err(|e| anyhow::anyhow!("Member directory mutex poisoned: {}", e))?;
        let login_taken = member.login_id.is_some()
            && members.values().any(|m| m.login_id == member.login_id);
        if members.contains_key(&member.identity) || login_taken {
            return Err(ServiceError::ValidationError(
                "Member already exists".to_string(),
            ));
        }
        members.insert(member.identity.clone(), member.clone());
        Ok(())
    }

    async fn finish_registration(&self, identity: &Identity) -> Result<(), ServiceError> {
        if let Some(member) = self
            .members
            .lock()
            .map_err(|e| anyhow::anyhow!("Member directory mutex poisoned: {}", e))?
            .get_mut(identity)
        {
            member.register_token = None;
        }
        Ok(())
    }
}
