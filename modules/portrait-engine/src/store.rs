// Postgres record store: the identity mapping (`people`) and the
// reference-holder tables.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::traits::RecordStore;
use crate::types::{HolderKind, HolderLocation, HolderRow, IdentityLink, PersonIdentity};

/// Where a holder kind keeps its rows. All names are compile-time constants.
#[derive(Debug, Clone, Copy)]
pub struct HolderTable {
    pub table: &'static str,
    pub id_column: &'static str,
    pub owner_column: &'static str,
    pub url_column: &'static str,
    pub updated_column: &'static str,
}

impl HolderTable {
    pub fn for_kind(kind: HolderKind) -> Self {
        match kind {
            HolderKind::Account => HolderTable {
                table: "accounts",
                id_column: "id",
                owner_column: "person_id",
                url_column: "avatar_url",
                updated_column: "updated_at",
            },
            HolderKind::PublicProfile => HolderTable {
                table: "public_profiles",
                id_column: "id",
                owner_column: "auth_user_id",
                url_column: "image_url",
                updated_column: "updated_at",
            },
        }
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT {id}::text AS row_id, {url} AS image_url, {updated} AS updated_at \
             FROM {table} \
             WHERE {owner}::text = ANY($1) \
             ORDER BY {updated} DESC NULLS LAST",
            id = self.id_column,
            url = self.url_column,
            updated = self.updated_column,
            table = self.table,
            owner = self.owner_column,
        )
    }

    fn update_sql(&self) -> String {
        format!(
            "UPDATE {table} SET {url} = $1, {updated} = now() WHERE {id}::text = $2",
            table = self.table,
            url = self.url_column,
            updated = self.updated_column,
            id = self.id_column,
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    record_identity: String,
    auth_identity: Option<String>,
}

impl From<IdentityRow> for IdentityLink {
    fn from(row: IdentityRow) -> Self {
        IdentityLink {
            record_identity: row.record_identity,
            auth_identity: row.auth_identity,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoredHolder {
    row_id: String,
    image_url: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn lookup_by_auth(&self, auth_identity: &str) -> Result<Option<IdentityLink>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id::text AS record_identity, auth_user_id AS auth_identity
            FROM people
            WHERE auth_user_id = $1
            LIMIT 1
            "#,
        )
        .bind(auth_identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn lookup_by_record(&self, record_identity: &str) -> Result<Option<IdentityLink>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id::text AS record_identity, auth_user_id AS auth_identity
            FROM people
            WHERE id::text = $1
            LIMIT 1
            "#,
        )
        .bind(record_identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_people(&self) -> Result<Vec<IdentityLink>> {
        let rows = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id::text AS record_identity, auth_user_id AS auth_identity
            FROM people
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn display_name(&self, person: &PersonIdentity) -> Result<Option<String>> {
        let ids = person.identities();
        let name = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT COALESCE(NULLIF(btrim(first_name), ''), NULLIF(btrim(display_name), ''))
            FROM people
            WHERE id::text = ANY($1) OR auth_user_id = ANY($1)
            LIMIT 1
            "#,
        )
        .bind(&ids)
        .fetch_optional(&self.pool)
        .await?;

        Ok(name.flatten())
    }

    async fn holders(&self, kind: HolderKind, identities: &[String]) -> Result<Vec<HolderRow>> {
        let table = HolderTable::for_kind(kind);
        let rows = sqlx::query_as::<_, StoredHolder>(&table.select_sql())
            .bind(identities)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| HolderRow {
                location: HolderLocation {
                    kind,
                    row_id: r.row_id,
                },
                image_url: r.image_url,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn write_image_url(&self, location: &HolderLocation, url: &str) -> Result<()> {
        let table = HolderTable::for_kind(location.kind);
        let result = sqlx::query(&table.update_sql())
            .bind(url)
            .bind(&location.row_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("{} row {} no longer exists", location.kind, location.row_id);
        }
        Ok(())
    }
}
