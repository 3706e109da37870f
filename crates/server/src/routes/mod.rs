//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                        - Liveness check
//! GET  /health/ready                  - Readiness check (database ping)
//!
//! # Products
//! GET  /products                      - Catalog listing (category/search filters)
//! GET  /products/{slug}               - Product detail
//!
//! # Cart
//! GET  /cart                          - Current cart (lines, totals, checkout link)
//! POST /cart/add                      - Add or update a line
//! POST /cart/remove                   - Remove units from a line
//! POST /cart/delete                   - Delete a line
//! POST /cart/clear                    - Delete all lines
//!
//! # Shipping
//! GET  /shipping                      - The owner's profile and addresses
//! GET  /shipping/current              - The selected address
//! GET  /shipping/{id}                 - One address
//! POST /shipping                      - Add an address
//! PUT  /shipping/update               - Partially update an address
//! PUT  /shipping/flag                 - Set/clear the default or selected flag
//!
//! # Orders
//! GET  /orders                        - Materialized orders
//! GET  /orders/carts                  - Archival (paid) carts
//!
//! # Checkout
//! POST /checkout/flutterwave          - Open a Flutterwave checkout
//! POST /checkout/paystack             - Open a Paystack checkout
//! POST /checkout/flutterwave/callback - Redirect-callback confirmation
//! POST /checkout/paystack/verify      - Redirect-callback confirmation
//!
//! # Webhooks
//! POST /webhooks/flutterwave          - Server-push confirmation (signed)
//! ```
//!
//! Identity: every cart/shipping/order/checkout handler resolves an owner
//! key from the optional bearer token and the `session_id` parameter; the
//! confirmation endpoints are keyed by external reference instead and carry
//! no owner.

pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;
pub mod shipping;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/delete", post(cart::delete))
        .route("/clear", post(cart::clear))
}

/// Create the shipping routes router.
pub fn shipping_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(shipping::index).post(shipping::create))
        .route("/current", get(shipping::current))
        .route("/update", put(shipping::update))
        .route("/flag", put(shipping::set_flag))
        .route("/{id}", get(shipping::show))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/carts", get(orders::carts))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/flutterwave", post(checkout::flutterwave))
        .route("/flutterwave/callback", post(checkout::flutterwave_callback))
        .route("/paystack", post(checkout::paystack))
        .route("/paystack/verify", post(checkout::paystack_verify))
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/flutterwave", post(webhooks::flutterwave))
}

/// Create all application routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/shipping", shipping_routes())
        .nest("/orders", order_routes())
        .nest("/checkout", checkout_routes())
        .nest("/webhooks", webhook_routes())
}
