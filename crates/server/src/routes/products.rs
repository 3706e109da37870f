//! Product catalog handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::models::{Category, Product, ProductFilter};
use crate::state::AppState;

/// Catalog listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<Category>,
    pub search: Option<String>,
}

/// List products, newest first.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<Vec<Product>>> {
    let filter = ProductFilter {
        category: query.category,
        search: query.search,
    };
    let products = state.store().list_products(&filter).await?;
    Ok(Json(products))
}

/// Product detail by slug.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    let product = state
        .store()
        .find_product_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_owned()))?;
    Ok(Json(product))
}
