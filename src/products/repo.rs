use serde::{Deserialize, Serialize};
use sqlx::{types::Decimal, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog entry. Unlike users, products are hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub struct NewProduct<'a> {
    pub seller_id: Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub price: Decimal,
    pub stock: i32,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
}

impl Product {
    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, name, description, price, stock, created_at, updated_at
            FROM products
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, name, description, price, stock, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(product)
    }

    pub async fn create(db: &PgPool, new: &NewProduct<'_>) -> anyhow::Result<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (seller_id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, seller_id, name, description, price, stock, created_at, updated_at
            "#,
        )
        .bind(new.seller_id)
        .bind(new.name)
        .bind(new.description)
        .bind(new.price)
        .bind(new.stock)
        .fetch_one(db)
        .await?;
        Ok(product)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        changes: &ProductChanges,
    ) -> anyhow::Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name        = COALESCE($2, name),
                description = COALESCE($3, description),
                price       = COALESCE($4, price),
                stock       = COALESCE($5, stock),
                updated_at  = now()
            WHERE id = $1
            RETURNING id, seller_id, name, description, price, stock, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.price)
        .bind(changes.stock)
        .fetch_optional(db)
        .await?;
        Ok(product)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
