use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

use crate::db::models::{CompRow, ListingRow, PriceRange, StoreStats};
use crate::error::Result;
use crate::types::{now_secs, Comp, CompSet, Listing};

const POOL_MAX_CONNECTIONS: u32 = 4;

/// Durable listings and comps, keyed by `url` and `key_title`.
///
/// One long-lived pool per process. Every upsert is a single
/// `INSERT .. ON CONFLICT DO UPDATE`, so writes to the same key are
/// last-write-wins with no read-modify-write window.
#[derive(Clone)]
pub struct Store {
    pool: sqlx::SqlitePool,
}

impl Store {
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self { pool })
    }

    pub async fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        let meta_json = serde_json::to_string(&listing.meta)?;
        sqlx::query(
            r#"
            INSERT INTO listings (source, url, title, price, currency, condition, ts, meta_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                source = excluded.source,
                title = excluded.title,
                price = excluded.price,
                currency = excluded.currency,
                condition = excluded.condition,
                ts = excluded.ts,
                meta_json = excluded.meta_json
            "#,
        )
        .bind(&listing.source)
        .bind(&listing.url)
        .bind(&listing.title)
        .bind(listing.price)
        .bind(&listing.currency)
        .bind(&listing.condition)
        .bind(listing.timestamp)
        .bind(meta_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert each listing in order; stops at the first storage error.
    pub async fn upsert_listings(&self, listings: &[Listing]) -> Result<usize> {
        for listing in listings {
            self.upsert_listing(listing).await?;
        }
        debug!(count = listings.len(), "listings upserted");
        Ok(listings.len())
    }

    pub async fn upsert_comp(&self, comp: &Comp) -> Result<()> {
        let count = i64::try_from(comp.count).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO comps (key_title, avg_price, median_price, count, ts)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key_title) DO UPDATE SET
                avg_price = excluded.avg_price,
                median_price = excluded.median_price,
                count = excluded.count,
                ts = excluded.ts
            "#,
        )
        .bind(&comp.key_title)
        .bind(comp.avg_price)
        .bind(comp.median_price)
        .bind(count)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_listing(&self, url: &str) -> Result<Option<ListingRow>> {
        let row = sqlx::query_as::<_, ListingRow>(
            "SELECT id, source, url, title, price, currency, condition, ts, meta_json FROM listings WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_comp(&self, key_title: &str) -> Result<Option<CompRow>> {
        let row = sqlx::query_as::<_, CompRow>(
            "SELECT key_title, avg_price, median_price, count, ts FROM comps WHERE key_title = ?",
        )
        .bind(key_title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All persisted comps, oldest first.
    pub async fn load_comps(&self) -> Result<CompSet> {
        let rows = sqlx::query_as::<_, CompRow>(
            "SELECT key_title, avg_price, median_price, count, ts FROM comps ORDER BY ts ASC, key_title ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Comp::from).collect())
    }

    pub async fn recent_listings(&self, limit: i64) -> Result<Vec<ListingRow>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, source, url, title, price, currency, condition, ts, meta_json
            FROM listings
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn listing_count(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_source = sqlx::query_as::<_, (String, i64)>(
            "SELECT source, COUNT(*) FROM listings GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;

        let (min, max, avg) = sqlx::query_as::<_, (Option<f64>, Option<f64>, Option<f64>)>(
            "SELECT MIN(price), MAX(price), AVG(price) FROM listings WHERE price > 0",
        )
        .fetch_one(&self.pool)
        .await?;

        let comps_total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comps")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            tables,
            listings_total: self.listing_count().await?,
            listings_by_source: by_source.into_iter().collect(),
            price_range: PriceRange { min, max, avg },
            comps_total,
        })
    }

    /// Operator-invoked retention. The pipeline itself never deletes.
    pub async fn prune_listings_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = now_secs() - f64::from(days) * 86_400.0;
        let result = sqlx::query("DELETE FROM listings WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        info!(days, removed = result.rows_affected(), "Pruned old listings");
        Ok(result.rows_affected())
    }
}
