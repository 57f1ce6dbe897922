//! MetadataStore (C1): sqlx-backed persistence for `networks` and
//! `memberships`.
//!
//! Follows the teacher's `db.rs` shape: `pub async fn verb_noun(pool: &SqlitePool, ...)`
//! functions over `sqlx::query`/`query_as`, additive `CREATE TABLE IF NOT EXISTS`
//! migrations, and upserts via `ON CONFLICT ... DO UPDATE SET`.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};

use crate::error::HubError;

#[derive(Debug, Clone, FromRow)]
pub struct NetworkRow {
    pub id: String,
    pub name: String,
    pub pin_hash: String,
    pub owner_key: String,
    pub subnet: String,
    pub created_at: i64,
    pub last_active_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct MembershipRow {
    pub network_id: String,
    pub public_key: String,
    pub assigned_ip: String,
    pub computer_name: String,
    pub joined_at: i64,
    pub last_connected_at: i64,
}

pub async fn connect(db_path: &str) -> Result<SqlitePool, HubError> {
    let url = format!("sqlite://{db_path}?mode=rwc");
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .map_err(HubError::from)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), HubError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            pin_hash        TEXT NOT NULL,
            owner_key       TEXT NOT NULL,
            subnet          TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            last_active_at  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS memberships (
            network_id        TEXT NOT NULL,
            public_key        TEXT NOT NULL,
            assigned_ip       TEXT NOT NULL,
            computer_name     TEXT NOT NULL,
            joined_at         INTEGER NOT NULL,
            last_connected_at INTEGER NOT NULL,
            PRIMARY KEY (network_id, public_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Additive index, errors swallowed if it already exists under an older
    // schema revision — matches the teacher's tolerant migration style.
    let _ = sqlx::query("CREATE INDEX IF NOT EXISTS idx_memberships_key ON memberships(public_key)")
        .execute(pool)
        .await;

    Ok(())
}

pub async fn insert_network(pool: &SqlitePool, row: &NetworkRow) -> Result<(), HubError> {
    sqlx::query(
        r#"
        INSERT INTO networks (id, name, pin_hash, owner_key, subnet, created_at, last_active_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            pin_hash = excluded.pin_hash,
            last_active_at = excluded.last_active_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.pin_hash)
    .bind(&row.owner_key)
    .bind(&row.subnet)
    .bind(row.created_at)
    .bind(row.last_active_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn rename_network(pool: &SqlitePool, network_id: &str, name: &str) -> Result<(), HubError> {
    sqlx::query("UPDATE networks SET name = ? WHERE id = ?")
        .bind(name)
        .bind(network_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_network(pool: &SqlitePool, network_id: &str, now: i64) -> Result<(), HubError> {
    sqlx::query("UPDATE networks SET last_active_at = ? WHERE id = ?")
        .bind(now)
        .bind(network_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_network(pool: &SqlitePool, network_id: &str) -> Result<(), HubError> {
    sqlx::query("DELETE FROM memberships WHERE network_id = ?")
        .bind(network_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM networks WHERE id = ?")
        .bind(network_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_network(pool: &SqlitePool, network_id: &str) -> Result<Option<NetworkRow>, HubError> {
    let row = sqlx::query_as::<_, NetworkRow>("SELECT * FROM networks WHERE id = ?")
        .bind(network_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_networks(pool: &SqlitePool) -> Result<Vec<NetworkRow>, HubError> {
    let rows = sqlx::query_as::<_, NetworkRow>("SELECT * FROM networks")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_expired_networks(
    pool: &SqlitePool,
    cutoff: i64,
) -> Result<Vec<NetworkRow>, HubError> {
    let rows = sqlx::query_as::<_, NetworkRow>("SELECT * FROM networks WHERE last_active_at < ?")
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn upsert_membership(pool: &SqlitePool, row: &MembershipRow) -> Result<(), HubError> {
    sqlx::query(
        r#"
        INSERT INTO memberships (network_id, public_key, assigned_ip, computer_name, joined_at, last_connected_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(network_id, public_key) DO UPDATE SET
            assigned_ip = excluded.assigned_ip,
            computer_name = excluded.computer_name,
            last_connected_at = excluded.last_connected_at
        "#,
    )
    .bind(&row.network_id)
    .bind(&row.public_key)
    .bind(&row.assigned_ip)
    .bind(&row.computer_name)
    .bind(row.joined_at)
    .bind(row.last_connected_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_membership(
    pool: &SqlitePool,
    network_id: &str,
    public_key: &str,
) -> Result<(), HubError> {
    sqlx::query("DELETE FROM memberships WHERE network_id = ? AND public_key = ?")
        .bind(network_id)
        .bind(public_key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_memberships_for_network(
    pool: &SqlitePool,
    network_id: &str,
) -> Result<Vec<MembershipRow>, HubError> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        "SELECT * FROM memberships WHERE network_id = ?",
    )
    .bind(network_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn insert_and_fetch_network() {
        let pool = memory_pool().await;
        let row = NetworkRow {
            id: "net1".into(),
            name: "office".into(),
            pin_hash: "hash".into(),
            owner_key: "owner".into(),
            subnet: "10.10.0.0/24".into(),
            created_at: 1000,
            last_active_at: 1000,
        };
        insert_network(&pool, &row).await.unwrap();
        let fetched = get_network(&pool, "net1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "office");
    }

    #[tokio::test]
    async fn upsert_network_updates_name() {
        let pool = memory_pool().await;
        let mut row = NetworkRow {
            id: "net1".into(),
            name: "office".into(),
            pin_hash: "hash".into(),
            owner_key: "owner".into(),
            subnet: "10.10.0.0/24".into(),
            created_at: 1000,
            last_active_at: 1000,
        };
        insert_network(&pool, &row).await.unwrap();
        row.name = "renamed".into();
        insert_network(&pool, &row).await.unwrap();
        let fetched = get_network(&pool, "net1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "renamed");
    }

    #[tokio::test]
    async fn membership_roundtrip() {
        let pool = memory_pool().await;
        let m = MembershipRow {
            network_id: "net1".into(),
            public_key: "key1".into(),
            assigned_ip: "10.10.0.1".into(),
            computer_name: "laptop".into(),
            joined_at: 1000,
            last_connected_at: 1000,
        };
        upsert_membership(&pool, &m).await.unwrap();
        let members = list_memberships_for_network(&pool, "net1").await.unwrap();
        assert_eq!(members.len(), 1);
        delete_membership(&pool, "net1", "key1").await.unwrap();
        let members = list_memberships_for_network(&pool, "net1").await.unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn expired_networks_filtered_by_cutoff() {
        let pool = memory_pool().await;
        insert_network(
            &pool,
            &NetworkRow {
                id: "old".into(),
                name: "old".into(),
                pin_hash: "h".into(),
                owner_key: "o".into(),
                subnet: "10.10.1.0/24".into(),
                created_at: 0,
                last_active_at: 0,
            },
        )
        .await
        .unwrap();
        let expired = list_expired_networks(&pool, 100).await.unwrap();
        assert_eq!(expired.len(), 1);
    }
}
