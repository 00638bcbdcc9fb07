//! Postgres credential store.
//!
//! Redemptions live in an append-only table keyed `(credential_id,
//! holder_id)`; the primary key is what makes double redemption detectable
//! without a read-check-write cycle. `append_redemption` wraps the
//! check-then-insert in one transaction with the credential row locked
//! `FOR UPDATE`, so attempts against the same credential serialize while
//! other credentials stay untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{AppendOutcome, CredentialStore};
use crate::models::{Credential, CredentialKind, NewCredential};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    kind: String,
    code: String,
    issuer: Option<Uuid>,
    scope: Uuid,
    description: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    active: bool,
    version: i64,
}

const CREDENTIAL_COLUMNS: &str =
    "id, kind, code, issuer, scope, description, issued_at, expires_at, active, version";

fn kind_from_str(kind: &str) -> anyhow::Result<CredentialKind> {
    match kind {
        "attendance" => Ok(CredentialKind::Attendance),
        "join" => Ok(CredentialKind::Join),
        "personal" => Ok(CredentialKind::Personal),
        other => anyhow::bail!("unknown credential kind in database: {}", other),
    }
}

impl CredentialRow {
    fn into_credential(self, redeemed_by: Vec<Uuid>) -> anyhow::Result<Credential> {
        Ok(Credential {
            id: self.id,
            kind: kind_from_str(&self.kind)?,
            code: self.code,
            issuer: self.issuer,
            scope: self.scope,
            description: self.description,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            active: self.active,
            redeemed_by,
            version: self.version,
        })
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn redemptions(&self, credential_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let holders = sqlx::query_scalar::<_, Uuid>(
            "SELECT holder_id FROM credential_redemptions WHERE credential_id = $1 ORDER BY redeemed_at ASC, holder_id ASC",
        )
        .bind(credential_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(holders)
    }

    async fn hydrate(&self, row: Option<CredentialRow>) -> anyhow::Result<Option<Credential>> {
        match row {
            Some(row) => {
                let holders = self.redemptions(row.id).await?;
                Ok(Some(row.into_credential(holders)?))
            }
            None => Ok(None),
        }
    }

    async fn hydrate_all(&self, rows: Vec<CredentialRow>) -> anyhow::Result<Vec<Credential>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let holders = self.redemptions(row.id).await?;
            out.push(row.into_credential(holders)?);
        }
        Ok(out)
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewCredential,
    ) -> anyhow::Result<CredentialRow> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            r#"INSERT INTO credentials (kind, code, issuer, scope, description, issued_at, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {CREDENTIAL_COLUMNS}"#
        ))
        .bind(new.kind.as_str())
        .bind(&new.code)
        .bind(new.issuer)
        .bind(new.scope)
        .bind(&new.description)
        .bind(new.issued_at)
        .bind(new.expires_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert(&self, new: NewCredential) -> anyhow::Result<Credential> {
        let mut tx = self.pool.begin().await?;
        let row = Self::insert_in(&mut tx, &new).await?;
        tx.commit().await?;
        row.into_credential(Vec::new())
    }

    async fn insert_superseding(&self, new: NewCredential) -> anyhow::Result<Credential> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE credentials SET active = FALSE, version = version + 1
             WHERE scope = $1 AND kind = $2 AND active = TRUE",
        )
        .bind(new.scope)
        .bind(new.kind.as_str())
        .execute(&mut *tx)
        .await?;
        let row = Self::insert_in(&mut tx, &new).await?;
        tx.commit().await?;
        row.into_credential(Vec::new())
    }

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn find_active_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
             WHERE scope = $1 AND kind = $2 AND active = TRUE
             ORDER BY issued_at DESC LIMIT 1"
        ))
        .bind(scope)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate(row).await
    }

    async fn list_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
             WHERE scope = $1 AND kind = $2 ORDER BY issued_at DESC"
        ))
        .bind(scope)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn list_by_issuer(&self, issuer: Uuid) -> anyhow::Result<Vec<Credential>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
             WHERE issuer = $1 ORDER BY issued_at DESC"
        ))
        .bind(issuer)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    async fn code_in_use(&self, code: &str) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM credentials WHERE code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn deactivate(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET active = FALSE, version = version + 1
             WHERE id = $1 AND active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // already inactive counts as success; only a missing row is `false`
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM credentials WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn deactivate_if_active(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET active = FALSE, version = version + 1
             WHERE id = $1 AND active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_redemption(&self, id: Uuid, holder: Uuid) -> anyhow::Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent redemptions of this credential;
        // the dropped transaction rolls back on every early return.
        let row = sqlx::query_scalar::<_, bool>(
            "SELECT active FROM credentials WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(active) = row else {
            return Ok(AppendOutcome::Conflict);
        };
        if !active {
            return Ok(AppendOutcome::Conflict);
        }

        let inserted = sqlx::query(
            "INSERT INTO credential_redemptions (credential_id, holder_id)
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(holder)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(AppendOutcome::Duplicate);
        }

        let updated = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE credentials SET version = version + 1 WHERE id = $1
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let holders = sqlx::query_scalar::<_, Uuid>(
            "SELECT holder_id FROM credential_redemptions WHERE credential_id = $1 ORDER BY redeemed_at ASC, holder_id ASC",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(AppendOutcome::Applied(updated.into_credential(holders)?))
    }

    async fn deactivate_expired(
        &self,
        kind: CredentialKind,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE credentials SET active = FALSE, version = version + 1
             WHERE kind = $1 AND active = TRUE AND expires_at <= $2",
        )
        .bind(kind.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
