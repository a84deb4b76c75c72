//! Request/response DTOs and query-parameter mapping.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use vendia_core::{BasisPoints, Cents, CustomerId, ProductId, SaleId, UserId};
use vendia_infra::store::{KardexQuery, Pagination, SaleFilter};
use vendia_ledger::{MovementType, NewMovement};
use vendia_sales::SriStatus;

use super::errors::json_error;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    /// Client-assigned id, or generated when absent.
    pub id: Option<ProductId>,
    pub stock: i64,
    pub unit_price: Cents,
    pub tax_rate_bp: BasisPoints,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub product_id: ProductId,
    pub movement: MovementType,
    pub quantity: i64,
    pub unit_cost: Cents,
    pub reason: String,
    pub actor_id: UserId,
}

impl RecordMovementRequest {
    pub fn into_movement(self) -> (ProductId, NewMovement) {
        (
            self.product_id,
            NewMovement {
                movement: self.movement,
                quantity: self.quantity,
                unit_cost: self.unit_cost,
                reason: self.reason,
                actor_id: self.actor_id,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ResendWebhookRequest {
    pub sale_id: SaleId,
    /// Per-request delivery target; falls back to the configured webhook.
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SalesParams {
    pub customer_id: Option<CustomerId>,
    pub estado_sri: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SalesParams {
    pub fn into_filter(self) -> Result<SaleFilter, axum::response::Response> {
        let estado_sri = self
            .estado_sri
            .as_deref()
            .map(|raw| {
                SriStatus::parse(raw).ok_or_else(|| {
                    json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_estado_sri",
                        format!("unknown estado_sri '{raw}'"),
                    )
                })
            })
            .transpose()?;

        Ok(SaleFilter {
            customer_id: self.customer_id,
            estado_sri,
            from: self.from,
            to: self.to,
            pagination: pagination(self.limit, self.offset),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LatestParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct KardexParams {
    pub product_id: Option<ProductId>,
    pub movement: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl KardexParams {
    pub fn into_query(self) -> Result<KardexQuery, axum::response::Response> {
        let movement = self
            .movement
            .as_deref()
            .map(|raw| {
                MovementType::parse(raw).ok_or_else(|| {
                    json_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_movement",
                        format!("unknown movement '{raw}'"),
                    )
                })
            })
            .transpose()?;

        Ok(KardexQuery {
            product_id: self.product_id,
            movement,
            from: self.from,
            to: self.to,
            pagination: pagination(self.limit, self.offset),
        })
    }
}

fn pagination(limit: Option<i64>, offset: Option<i64>) -> Pagination {
    let defaults = Pagination::default();
    Pagination {
        limit: limit.unwrap_or(defaults.limit),
        offset: offset.unwrap_or(defaults.offset),
    }
}
