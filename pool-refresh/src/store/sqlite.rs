use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::{PoolStore, PoolTransaction, StoreError};
use crate::refresh::model::{Content, ExistingSnapshot, Pool, PoolField, PoolType, Product};
use crate::refresh::operations::PoolUpdate;

/// Pools as rows, products and content as JSON documents
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply pending migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if let Some(dir) = options.get_filename().parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|err| {
                    StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), err))
                })?;
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace pools outside of a refresh
    pub async fn save_pools(&self, pools: &[Pool]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for pool in pools {
            sqlx::query(
                r#"
                INSERT INTO pools (
                    owner_id, id, pool_type, product_id, derived_product_id, product_name,
                    quantity, start_date, end_date, contract_number, account_number, order_number
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (owner_id, id) DO UPDATE SET
                    pool_type = excluded.pool_type,
                    product_id = excluded.product_id,
                    derived_product_id = excluded.derived_product_id,
                    product_name = excluded.product_name,
                    quantity = excluded.quantity,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    contract_number = excluded.contract_number,
                    account_number = excluded.account_number,
                    order_number = excluded.order_number,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&pool.owner_id)
            .bind(&pool.id)
            .bind(pool.pool_type.as_str())
            .bind(&pool.product_id)
            .bind(&pool.derived_product_id)
            .bind(&pool.product_name)
            .bind(pool.quantity)
            .bind(pool.start_date)
            .bind(pool.end_date)
            .bind(&pool.contract_number)
            .bind(&pool.account_number)
            .bind(&pool.order_number)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn save_products(&self, owner_id: &str, products: &[Product]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for product in products {
            upsert_product(&mut *tx, owner_id, product).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn save_content(&self, owner_id: &str, content: &[Content]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for item in content {
            upsert_content(&mut *tx, owner_id, item).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Persist a whole snapshot for one owner. Pool owner ids are taken from
    /// the rows themselves.
    pub async fn seed(&self, owner_id: &str, snapshot: &ExistingSnapshot) -> Result<(), StoreError> {
        self.save_content(owner_id, &snapshot.content).await?;
        self.save_products(owner_id, &snapshot.products).await?;
        self.save_pools(&snapshot.pools).await?;
        Ok(())
    }
}

async fn upsert_product(
    conn: &mut SqliteConnection,
    owner_id: &str,
    product: &Product,
) -> Result<(), StoreError> {
    let data = serde_json::to_string(product)?;
    sqlx::query(
        r#"
        INSERT INTO products (owner_id, id, data_json) VALUES (?, ?, ?)
        ON CONFLICT (owner_id, id) DO UPDATE SET
            data_json = excluded.data_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(owner_id)
    .bind(&product.id)
    .bind(data)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_content(
    conn: &mut SqliteConnection,
    owner_id: &str,
    content: &Content,
) -> Result<(), StoreError> {
    let data = serde_json::to_string(content)?;
    sqlx::query(
        r#"
        INSERT INTO content (owner_id, id, data_json) VALUES (?, ?, ?)
        ON CONFLICT (owner_id, id) DO UPDATE SET
            data_json = excluded.data_json,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(owner_id)
    .bind(&content.id)
    .bind(data)
    .execute(conn)
    .await?;
    Ok(())
}

fn pool_from_row(row: &SqliteRow) -> Result<Pool, StoreError> {
    let pool_type: String = row.try_get("pool_type")?;
    let pool_type = PoolType::parse(&pool_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown pool type '{}'", pool_type)))?;

    Ok(Pool {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        pool_type,
        product_id: row.try_get("product_id")?,
        derived_product_id: row.try_get("derived_product_id")?,
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        contract_number: row.try_get("contract_number")?,
        account_number: row.try_get("account_number")?,
        order_number: row.try_get("order_number")?,
    })
}

#[async_trait]
impl PoolStore for SqliteStore {
    async fn list_pools(&self, owner_id: &str) -> Result<Vec<Pool>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id, id, pool_type, product_id, derived_product_id, product_name,
                   quantity, start_date, end_date, contract_number, account_number, order_number
            FROM pools
            WHERE owner_id = ?
            ORDER BY id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pool_from_row).collect()
    }

    async fn list_products(&self, owner_id: &str) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT data_json FROM products WHERE owner_id = ? ORDER BY id")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data_json")?;
            products.push(serde_json::from_str(&data)?);
        }
        Ok(products)
    }

    async fn list_content(&self, owner_id: &str) -> Result<Vec<Content>, StoreError> {
        let rows = sqlx::query("SELECT data_json FROM content WHERE owner_id = ? ORDER BY id")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        let mut content = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data_json")?;
            content.push(serde_json::from_str(&data)?);
        }
        Ok(content)
    }

    async fn begin(&self) -> Result<Box<dyn PoolTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx: Some(tx) }))
    }
}

/// Rolls back on drop unless committed
struct SqliteTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl PoolTransaction for SqliteTransaction {
    async fn create_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for pool in pools {
            sqlx::query(
                r#"
                INSERT INTO pools (
                    owner_id, id, pool_type, product_id, derived_product_id, product_name,
                    quantity, start_date, end_date, contract_number, account_number, order_number
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&pool.owner_id)
            .bind(&pool.id)
            .bind(pool.pool_type.as_str())
            .bind(&pool.product_id)
            .bind(&pool.derived_product_id)
            .bind(&pool.product_name)
            .bind(pool.quantity)
            .bind(pool.start_date)
            .bind(pool.end_date)
            .bind(&pool.contract_number)
            .bind(&pool.account_number)
            .bind(&pool.order_number)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn update_pools(&mut self, updates: &[PoolUpdate]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for update in updates {
            let pool = &update.pool;
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE pools SET updated_at = ");
            builder.push_bind(Utc::now());

            for field in &update.changed_fields {
                builder.push(", ").push(field.as_str()).push(" = ");
                match field {
                    PoolField::ProductId => {
                        builder.push_bind(pool.product_id.clone());
                    }
                    PoolField::DerivedProductId => {
                        builder.push_bind(pool.derived_product_id.clone());
                    }
                    PoolField::ProductName => {
                        builder.push_bind(pool.product_name.clone());
                    }
                    PoolField::Quantity => {
                        builder.push_bind(pool.quantity);
                    }
                    PoolField::StartDate => {
                        builder.push_bind(pool.start_date);
                    }
                    PoolField::EndDate => {
                        builder.push_bind(pool.end_date);
                    }
                    PoolField::ContractNumber => {
                        builder.push_bind(pool.contract_number.clone());
                    }
                    PoolField::AccountNumber => {
                        builder.push_bind(pool.account_number.clone());
                    }
                    PoolField::OrderNumber => {
                        builder.push_bind(pool.order_number.clone());
                    }
                }
            }

            builder
                .push(" WHERE owner_id = ")
                .push_bind(pool.owner_id.clone())
                .push(" AND id = ")
                .push_bind(pool.id.clone());

            let result = builder.build().execute(&mut **tx).await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::Constraint(format!(
                    "pool '{}' does not exist",
                    pool.id
                )));
            }
        }
        Ok(())
    }

    async fn delete_pools(&mut self, pools: &[Pool]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for pool in pools {
            sqlx::query("DELETE FROM pools WHERE owner_id = ? AND id = ?")
                .bind(&pool.owner_id)
                .bind(&pool.id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn save_products(&mut self, owner_id: &str, products: &[Product]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for product in products {
            upsert_product(&mut **tx, owner_id, product).await?;
        }
        Ok(())
    }

    async fn remove_products(&mut self, owner_id: &str, product_ids: &[String]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for id in product_ids {
            sqlx::query("DELETE FROM products WHERE owner_id = ? AND id = ?")
                .bind(owner_id)
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn save_content(&mut self, owner_id: &str, content: &[Content]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for item in content {
            upsert_content(&mut **tx, owner_id, item).await?;
        }
        Ok(())
    }

    async fn remove_content(&mut self, owner_id: &str, content_ids: &[String]) -> Result<(), StoreError> {
        let tx = self.tx()?;
        for id in content_ids {
            sqlx::query("DELETE FROM content WHERE owner_id = ? AND id = ?")
                .bind(owner_id)
                .bind(id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::fixtures::{
        OWNER, content_info, date, existing_pool, product_info, subscription,
    };

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn pool(id: &str) -> Pool {
        existing_pool(&subscription(id, product_info("prod-a", &[])))
    }

    #[tokio::test]
    async fn test_save_and_list_pools() {
        let store = memory_store().await;
        let mut derived = pool("pool-2");
        derived.pool_type = PoolType::StackDerived;
        store.save_pools(&[pool("pool-1"), derived.clone()]).await.unwrap();

        let pools = store.list_pools(OWNER).await.unwrap();
        assert_eq!(pools, vec![pool("pool-1"), derived]);
        assert!(store.list_pools("other-owner").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_products_round_trip_as_json() {
        let store = memory_store().await;
        let product = Product::from_info(&product_info("prod-a", &["content-1"]));
        store.save_products(OWNER, std::slice::from_ref(&product)).await.unwrap();

        assert_eq!(store.list_products(OWNER).await.unwrap(), vec![product]);
    }

    #[tokio::test]
    async fn test_transaction_applies_only_changed_fields() {
        let store = memory_store().await;
        store.save_pools(&[pool("pool-1"), pool("pool-2")]).await.unwrap();

        let previous = pool("pool-1");
        let mut desired = previous.clone();
        desired.quantity = 99;
        desired.end_date = date(2030, 1, 1);
        let update = PoolUpdate::new(&previous, &desired, false);

        let mut tx = store.begin().await.unwrap();
        tx.create_pools(&[pool("pool-3")]).await.unwrap();
        tx.update_pools(&[update]).await.unwrap();
        tx.delete_pools(&[pool("pool-2")]).await.unwrap();
        tx.commit().await.unwrap();

        let pools = store.list_pools(OWNER).await.unwrap();
        let ids: Vec<&str> = pools.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["pool-1", "pool-3"]);
        assert_eq!(pools[0], desired);
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let store = memory_store().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.create_pools(&[pool("pool-1")]).await.unwrap();
        }

        assert!(store.list_pools(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_missing_pool_fails() {
        let store = memory_store().await;
        let previous = pool("pool-1");
        let mut desired = previous.clone();
        desired.quantity = 2;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .update_pools(&[PoolUpdate::new(&previous, &desired, false)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_transaction_saves_and_removes_dependencies() {
        let store = memory_store().await;
        let old = Product::from_info(&product_info("prod-old", &[]));
        store.save_products(OWNER, &[old]).await.unwrap();
        store
            .save_content(OWNER, &[Content::from_info(&content_info("content-old"))])
            .await
            .unwrap();

        let mut renamed = product_info("prod-new", &["content-new"]);
        renamed.name = "Renamed".to_string();
        let product = Product::from_info(&renamed);
        let content = Content::from_info(&content_info("content-new"));

        let mut tx = store.begin().await.unwrap();
        tx.save_content(OWNER, std::slice::from_ref(&content)).await.unwrap();
        tx.save_products(OWNER, std::slice::from_ref(&product)).await.unwrap();
        tx.remove_products(OWNER, &["prod-old".to_string()]).await.unwrap();
        tx.remove_content(OWNER, &["content-old".to_string()]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.list_products(OWNER).await.unwrap(), vec![product]);
        assert_eq!(store.list_content(OWNER).await.unwrap(), vec![content]);
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let store = memory_store().await;
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::TransactionClosed)));
    }
}
