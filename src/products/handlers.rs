use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use sqlx::types::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::error::ApiError;
use crate::products::dto::{
    CreateProductRequest, Pagination, ProductResponse, UpdateProductRequest,
};
use crate::products::repo::{NewProduct, Product, ProductChanges};
use crate::state::AppState;
use crate::users::repo::Role;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            patch(update_product).get(get_product).delete(delete_product),
        )
}

fn validate_price(price: Decimal) -> Result<(), ApiError> {
    if price.is_sign_negative() {
        return Err(ApiError::Validation {
            field: "price",
            message: "price must not be negative".into(),
        });
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<(), ApiError> {
    if stock < 0 {
        return Err(ApiError::Validation {
            field: "stock",
            message: "stock must not be negative".into(),
        });
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = Product::list(&state.db, p.limit, p.offset).await?;
    Ok(Json(
        products.into_iter().map(ProductResponse::from).collect(),
    ))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = Product::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    Ok(Json(product.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation {
            field: "name",
            message: "name must not be empty".into(),
        });
    }
    validate_price(payload.price)?;
    validate_stock(payload.stock)?;

    let product = Product::create(
        &state.db,
        &NewProduct {
            seller_id: claims.sub,
            name: payload.name.trim(),
            description: payload.description.as_deref(),
            price: payload.price,
            stock: payload.stock,
        },
    )
    .await?;

    info!(product_id = %product.id, seller_id = %claims.sub, "product created");
    Ok((StatusCode::CREATED, Json(product.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    if let Some(price) = payload.price {
        validate_price(price)?;
    }
    if let Some(stock) = payload.stock {
        validate_stock(stock)?;
    }

    let existing = Product::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;

    // Sellers touch only their own listings; admins touch any
    if claims.role == Role::Seller && existing.seller_id != claims.sub {
        warn!(product_id = %id, user_id = %claims.sub, "seller updating foreign product");
        return Err(ApiError::Forbidden);
    }

    let changes = ProductChanges {
        name: payload.name,
        description: payload.description,
        price: payload.price,
        stock: payload.stock,
    };
    let product = Product::update(&state.db, id, &changes)
        .await?
        .ok_or(ApiError::NotFound("product"))?;

    info!(product_id = %product.id, "product updated");
    Ok(Json(product.into()))
}

#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !Product::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("product"));
    }
    info!(product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}
