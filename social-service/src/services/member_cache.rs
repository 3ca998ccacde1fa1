use std::collections::HashMap;

use crate::models::{Identity, Member};
use crate::services::{MemberDirectory, ServiceError};

/// Request-scoped memo of member snapshots.
///
/// Created per request and dropped with it, so a snapshot never outlives the
/// request that loaded it.
#[derive(Debug, Default)]
pub struct MemberCache {
    members: HashMap<Identity, Option<Member>>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load(
        &mut self,
        identity: &Identity,
        directory: &dyn MemberDirectory,
    ) -> Result<Option<Member>, ServiceError> {
        if let Some(member) = self.members.get(identity) {
            return Ok(member.clone());
        }
        let member = directory.find(identity).await?;
        self.members.insert(identity.clone(), member.clone());
        Ok(member)
    }

    pub fn invalidate(&mut self, identity: &Identity) {
        self.members.remove(identity);
    }
}
