//! 退款工具
//!
//! 所有策略检查与扣减在订单记录的独占更新区内完成：同一订单上的并发退款按顺序生效，
//! 幂等键一旦被消费就不会再产生第二次扣减。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::tools::policy::{evaluate_refund, PolicyLimits, RefundDisposition};
use crate::tools::schema::{IssueRefundInput, IssueRefundOutput};
use crate::tools::store::RecordStore;
use crate::tools::{Tool, ToolContext, ToolError, ToolName};

pub struct IssueRefundTool {
    store: Arc<RecordStore>,
    limits: PolicyLimits,
}

impl IssueRefundTool {
    pub fn new(store: Arc<RecordStore>, limits: PolicyLimits) -> Self {
        Self { store, limits }
    }
}

#[async_trait]
impl Tool for IssueRefundTool {
    type Input = IssueRefundInput;
    type Output = IssueRefundOutput;

    fn name(&self) -> ToolName {
        ToolName::IssueRefund
    }

    fn description(&self) -> &str {
        "Issue a refund on one of the customer's shipped or delivered orders, subject to refund \
         policy. Args: {\"order_id\": \"ord_...\", \"amount_usd\": 10.0, \"reason\": \"...\", \
         \"idempotency_key\": \"optional\"}"
    }

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        let limits = self.limits;
        let now = Utc::now();
        let user_id = ctx.user_id().to_string();

        self.store.update_order(&input.order_id, |order| {
            let disposition = evaluate_refund(
                order,
                &user_id,
                input.amount_usd,
                input.idempotency_key.as_deref(),
                &limits,
                now,
            )?;

            if disposition == RefundDisposition::Duplicate {
                return Ok(IssueRefundOutput {
                    order_id: order.order_id.clone(),
                    approved: true,
                    refunded_amount_usd: 0.0,
                    currency: "USD".to_string(),
                    refund_id: "refund_duplicate".to_string(),
                    message: "Duplicate refund request detected; no additional refund issued."
                        .to_string(),
                });
            }

            order.refunded_amount += input.amount_usd;
            if let Some(key) = &input.idempotency_key {
                order.used_idempotency_keys.insert(key.clone());
            }

            let refund_id = format!("rf_{}", &Uuid::new_v4().simple().to_string()[..12]);
            tracing::info!(
                order_id = %order.order_id,
                refund_id = %refund_id,
                amount_usd = input.amount_usd,
                "Refund applied"
            );

            Ok(IssueRefundOutput {
                order_id: order.order_id.clone(),
                approved: true,
                refunded_amount_usd: input.amount_usd,
                currency: "USD".to_string(),
                refund_id,
                message: "Refund approved and initiated.".to_string(),
            })
        })
    }
}
