//! 订单查询与物流追踪工具（只读）

use std::sync::Arc;

use async_trait::async_trait;

use crate::tools::policy::assert_order_belongs_to_user;
use crate::tools::schema::{
    GetOrderStatusInput, GetOrderStatusOutput, OrderLineItem, TrackShipmentInput,
    TrackShipmentOutput,
};
use crate::tools::store::RecordStore;
use crate::tools::{Tool, ToolContext, ToolError, ToolName};

/// get_order_status：仅允许查询自己的订单
pub struct GetOrderStatusTool {
    store: Arc<RecordStore>,
}

impl GetOrderStatusTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetOrderStatusTool {
    type Input = GetOrderStatusInput;
    type Output = GetOrderStatusOutput;

    fn name(&self) -> ToolName {
        ToolName::GetOrderStatus
    }

    fn description(&self) -> &str {
        "Look up the status, total, refunds and line items of one of the customer's orders. \
         Args: {\"order_id\": \"ord_...\"}"
    }

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        let order = self
            .store
            .get_order(&input.order_id)
            .ok_or_else(|| ToolError::Validation("Order not found.".to_string()))?;

        assert_order_belongs_to_user(&order, ctx.user_id())?;

        Ok(GetOrderStatusOutput {
            order_id: order.order_id,
            status: order.status,
            created_at: order.created_at,
            total_amount_usd: order.total_amount,
            refunded_amount_usd: order.refunded_amount,
            currency: "USD".to_string(),
            items: order
                .items
                .into_iter()
                .map(|i| OrderLineItem {
                    sku: i.sku,
                    name: i.name,
                    quantity: i.quantity,
                    unit_price_usd: i.unit_price_usd,
                })
                .collect(),
        })
    }
}

/// track_shipment：按 tracking_id，或按（自己的）order_id 找到 tracking_id
pub struct TrackShipmentTool {
    store: Arc<RecordStore>,
}

impl TrackShipmentTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for TrackShipmentTool {
    type Input = TrackShipmentInput;
    type Output = TrackShipmentOutput;

    fn name(&self) -> ToolName {
        ToolName::TrackShipment
    }

    fn description(&self) -> &str {
        "Track a shipment by tracking_id, or by the customer's order_id. \
         Args: {\"tracking_id\": \"trk_...\"} or {\"order_id\": \"ord_...\"}"
    }

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        let tracking_id = match (input.tracking_id, input.order_id) {
            (Some(t), _) => {
                // 运单号同样要经过订单归属校验
                let order = self
                    .store
                    .find_order_by_tracking(&t)
                    .ok_or_else(|| ToolError::Validation("Shipment not found.".to_string()))?;
                assert_order_belongs_to_user(&order, ctx.user_id())?;
                t
            }
            (None, Some(order_id)) => {
                let order = self
                    .store
                    .get_order(&order_id)
                    .ok_or_else(|| ToolError::Validation("Order not found.".to_string()))?;
                assert_order_belongs_to_user(&order, ctx.user_id())?;
                order.tracking_id.ok_or_else(|| {
                    ToolError::Validation("Tracking id not found for this order.".to_string())
                })?
            }
            (None, None) => {
                return Err(ToolError::Validation(
                    "Provide either tracking_id or order_id.".to_string(),
                ))
            }
        };

        let shipment = self
            .store
            .get_shipment(&tracking_id)
            .ok_or_else(|| ToolError::Validation("Shipment not found.".to_string()))?;

        Ok(TrackShipmentOutput {
            tracking_id: shipment.tracking_id,
            carrier: shipment.carrier,
            status: shipment.status,
            estimated_delivery: shipment.estimated_delivery,
            last_update: shipment.last_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::store::{OrderStatus, ShipmentStatus};

    fn store() -> Arc<RecordStore> {
        Arc::new(RecordStore::seeded())
    }

    #[tokio::test]
    async fn test_get_own_order() {
        let tool = GetOrderStatusTool::new(store());
        let ctx = ToolContext::customer("user_123", "req_1");
        let out = tool
            .run(&ctx, GetOrderStatusInput { order_id: "ord_XYZ78901".into() })
            .await
            .unwrap();
        assert_eq!(out.status, OrderStatus::Shipped);
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.total_amount_usd, 120.0);
    }

    #[tokio::test]
    async fn test_other_users_order_is_policy_error() {
        let tool = GetOrderStatusTool::new(store());
        let ctx = ToolContext::customer("user_999", "req_1");
        let err = tool
            .run(&ctx, GetOrderStatusInput { order_id: "ord_XYZ78901".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));
    }

    #[tokio::test]
    async fn test_missing_order_is_validation_error() {
        let tool = GetOrderStatusTool::new(store());
        let ctx = ToolContext::customer("user_123", "req_1");
        let err = tool
            .run(&ctx, GetOrderStatusInput { order_id: "ord_NOPE0000".into() })
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Validation("Order not found.".into()));
    }

    #[tokio::test]
    async fn test_track_by_order_id() {
        let tool = TrackShipmentTool::new(store());
        let ctx = ToolContext::customer("user_123", "req_1");
        let out = tool
            .run(
                &ctx,
                TrackShipmentInput { tracking_id: None, order_id: Some("ord_XYZ78901".into()) },
            )
            .await
            .unwrap();
        assert_eq!(out.tracking_id, "trk_ABC12345");
        assert_eq!(out.carrier, "UPS");
        assert_eq!(out.status, ShipmentStatus::InTransit);
    }

    #[tokio::test]
    async fn test_track_by_order_id_checks_ownership() {
        let tool = TrackShipmentTool::new(store());
        let ctx = ToolContext::customer("user_999", "req_1");
        let err = tool
            .run(
                &ctx,
                TrackShipmentInput { tracking_id: None, order_id: Some("ord_XYZ78901".into()) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));
    }

    #[tokio::test]
    async fn test_track_by_tracking_id_checks_ownership() {
        let tool = TrackShipmentTool::new(store());
        let input = || TrackShipmentInput { tracking_id: Some("trk_ABC12345".into()), order_id: None };

        let out = tool
            .run(&ToolContext::customer("user_123", "req_1"), input())
            .await
            .unwrap();
        assert_eq!(out.carrier, "UPS");

        let err = tool
            .run(&ToolContext::customer("user_999", "req_1"), input())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));
    }

    #[tokio::test]
    async fn test_unowned_tracking_id_is_not_found() {
        let store = store();
        store.insert_shipment(crate::tools::store::Shipment {
            tracking_id: "trk_ORPHAN01".into(),
            carrier: "FedEx".into(),
            status: ShipmentStatus::LabelCreated,
            last_update: chrono::Utc::now(),
            estimated_delivery: None,
        });
        let tool = TrackShipmentTool::new(store);
        let err = tool
            .run(
                &ToolContext::customer("user_123", "req_1"),
                TrackShipmentInput { tracking_id: Some("trk_ORPHAN01".into()), order_id: None },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Validation("Shipment not found.".into()));
    }
}
