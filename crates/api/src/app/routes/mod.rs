use axum::Router;

pub mod billing;
pub mod kardex;
pub mod products;
pub mod sales;
pub mod system;

/// Router for all POS endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/sales", sales::router())
        .nest("/kardex", kardex::router())
        .nest("/billing", billing::router())
}
