//! PostgreSQL persistence for relationships, members and the deny list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction};

use crate::models::{Identity, Member, PairKey, Relationship, RelationshipState};
use crate::services::{
    relationship_store::{apply_cas, apply_pair},
    DenyList, MemberDirectory, RelationshipStore, ServiceError,
};

#[derive(Debug, FromRow)]
struct RelationshipRow {
    low_identity: String,
    high_identity: String,
    low_to_high: String,
    high_to_low: String,
    updated_at: Option<DateTime<Utc>>,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<Relationship, ServiceError> {
        let low = Identity::parse(self.low_identity)?;
        let high = Identity::parse(self.high_identity)?;
        let key = PairKey::new(&low, &high).ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!("Stored relationship pairs a member with itself"))
        })?;
        Ok(Relationship {
            key,
            low_to_high: parse_state(&self.low_to_high)?,
            high_to_low: parse_state(&self.high_to_low)?,
            updated_at: self.updated_at,
        })
    }
}

fn parse_state(raw: &str) -> Result<RelationshipState, ServiceError> {
    RelationshipState::parse(raw)
        .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Unknown relationship state: {}", raw)))
}

#[derive(Debug, FromRow)]
struct MemberRow {
    identity: String,
    login_id: Option<String>,
    password_hash: Option<String>,
    is_active: bool,
    register_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = ServiceError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Member {
            identity: Identity::parse(row.identity)?,
            login_id: row.login_id,
            password_hash: row.password_hash,
            is_active: row.is_active,
            register_token: row.register_token,
            created_at: row.created_at,
        })
    }
}

const MEMBER_COLUMNS: &str =
    "identity, login_id, password_hash, is_active, register_token, created_at";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::from(e)
        })?;
        Ok(())
    }

    /// Lock the pair row for the rest of the transaction, creating it first
    /// if the pair has never interacted.
    async fn lock_pair(
        tx: &mut Transaction<'_, Postgres>,
        key: &PairKey,
    ) -> Result<Relationship, ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO relationships (low_identity, high_identity)
            VALUES ($1, $2)
            ON CONFLICT (low_identity, high_identity) DO NOTHING
            "#,
        )
        .bind(key.low().as_str())
        .bind(key.high().as_str())
        .execute(&mut **tx)
        .await?;

        sqlx::query_as::<_, RelationshipRow>(
            r#"
            SELECT low_identity, high_identity, low_to_high, high_to_low, updated_at
            FROM relationships
            WHERE low_identity = $1 AND high_identity = $2
            FOR UPDATE
            "#,
        )
        .bind(key.low().as_str())
        .bind(key.high().as_str())
        .fetch_one(&mut **tx)
        .await?
        .into_relationship()
    }

    async fn store_pair(
        tx: &mut Transaction<'_, Postgres>,
        record: &Relationship,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE relationships
            SET low_to_high = $3, high_to_low = $4, updated_at = $5
            WHERE low_identity = $1 AND high_identity = $2
            "#,
        )
        .bind(record.key.low().as_str())
        .bind(record.key.high().as_str())
        .bind(record.low_to_high.as_str())
        .bind(record.high_to_low.as_str())
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Run a conditional write on one pair inside a single transaction.
    async fn write_pair(
        &self,
        key: PairKey,
        apply: impl FnOnce(&mut Relationship) -> Result<bool, ServiceError> + Send,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;
        let mut record = Self::lock_pair(&mut tx, &key).await?;

        let written = apply(&mut record)?;
        if written {
            Self::store_pair(&mut tx, &record).await?;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn find_member_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Member>, ServiceError> {
        let sql = format!("SELECT {} FROM members WHERE {} = $1", MEMBER_COLUMNS, column);
        sqlx::query_as::<_, MemberRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(Member::try_from)
            .transpose()
    }
}

fn pair_key(a: &Identity, b: &Identity) -> Result<PairKey, ServiceError> {
    PairKey::new(a, b).ok_or(ServiceError::InvalidTarget)
}

#[async_trait]
impl RelationshipStore for Database {
    async fn fetch(&self, key: &PairKey) -> Result<Relationship, ServiceError> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            r#"
            SELECT low_identity, high_identity, low_to_high, high_to_low, updated_at
            FROM relationships
            WHERE low_identity = $1 AND high_identity = $2
            "#,
        )
        .bind(key.low().as_str())
        .bind(key.high().as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_relationship(),
            None => Ok(Relationship::new(key.clone())),
        }
    }

    async fn cas_set(
        &self,
        from: &Identity,
        to: &Identity,
        expected: RelationshipState,
        new: RelationshipState,
    ) -> Result<bool, ServiceError> {
        self.write_pair(pair_key(from, to)?, |record| {
            apply_cas(record, from, expected, new)
        })
        .await
    }

    async fn set_pair(
        &self,
        a: &Identity,
        b: &Identity,
        expected: (RelationshipState, RelationshipState),
        new: (RelationshipState, RelationshipState),
    ) -> Result<bool, ServiceError> {
        self.write_pair(pair_key(a, b)?, |record| {
            apply_pair(record, a, expected, new)
        })
        .await
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Database::health_check(self).await
    }
}

#[async_trait]
impl DenyList for Database {
    async fn is_denied(&self, identity: &Identity) -> Result<bool, ServiceError> {
        let denied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM member_denylist WHERE identity = $1)",
        )
        .bind(identity.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(denied)
    }
}

#[async_trait]
impl MemberDirectory for Database {
    async fn find(&self, identity: &Identity) -> Result<Option<Member>, ServiceError> {
        self.find_member_where("identity", identity.as_str()).await
    }

    async fn find_by_login(&self, login_id: &str) -> Result<Option<Member>, ServiceError> {
        self.find_member_where("login_id", login_id).await
    }

    async fn find_by_register_token(&self, token: &str) -> Result<Option<Member>, ServiceError> {
        self.find_member_where("register_token", token).await
    }

    async fn create(&self, member: &Member) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO members (identity, login_id, password_hash, is_active, register_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(member.identity.as_str())
        .bind(&member.login_id)
        .bind(&member.password_hash)
        .bind(member.is_active)
        .bind(&member.register_token)
        .bind(member.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                ServiceError::ValidationError("Member already exists".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn finish_registration(&self, identity: &Identity) -> Result<(), ServiceError> {
        sqlx::query("UPDATE members SET register_token = NULL WHERE identity = $1")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
