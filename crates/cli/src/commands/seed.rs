//! Seed the product catalog.
//!
//! Idempotent: a product whose derived slug already exists is skipped.

use rust_decimal::Decimal;

use zentro_server::models::{Category, NewProduct};
use zentro_server::store::{CommerceStore, PgStore, StoreError};

fn catalog() -> Vec<NewProduct> {
    vec![
        NewProduct {
            title: "Wireless Headphones".to_owned(),
            price: Decimal::new(14_999, 2),
            image: None,
            category: Some(Category::Electronics),
            description: Some("Over-ear, 30h battery".to_owned()),
        },
        NewProduct {
            title: "Gold Plated Ring".to_owned(),
            price: Decimal::new(8_250, 2),
            image: None,
            category: Some(Category::Jewelry),
            description: None,
        },
        NewProduct {
            title: "Linen Shirt".to_owned(),
            price: Decimal::new(4_500, 2),
            image: None,
            category: Some(Category::Clothings),
            description: Some("Relaxed fit".to_owned()),
        },
        NewProduct {
            title: "USB-C Charger 65W".to_owned(),
            price: Decimal::new(6_000, 2),
            image: None,
            category: Some(Category::Electronics),
            description: None,
        },
    ]
}

/// Insert the demo catalog.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let store = PgStore::new(pool);

    let mut created = 0;
    let mut skipped = 0;
    for product in catalog() {
        match store.create_product(product).await {
            Ok(p) => {
                tracing::info!(slug = %p.slug, "seeded product");
                created += 1;
            }
            Err(StoreError::Conflict(_)) => skipped += 1,
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(created, skipped, "catalog seed finished");
    Ok(())
}
