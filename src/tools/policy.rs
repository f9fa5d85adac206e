//! 业务策略：纯函数，不做任何副作用
//!
//! 策略在代码里执行而不是写在 prompt 里。违反策略返回 `ToolError::Policy`（而非 Validation），
//! 这是业务规则拒绝，与参数格式错误区分开。

use chrono::{DateTime, Duration, Utc};

use crate::config::PolicySection;
use crate::tools::store::{Order, OrderStatus};
use crate::tools::ToolError;

/// 浮点金额比较容差
const AMOUNT_EPSILON: f64 = 1e-9;

/// 退款限额（来自配置 [policy]）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolicyLimits {
    pub refund_window_days: i64,
    pub refund_max_amount: f64,
}

impl From<&PolicySection> for PolicyLimits {
    fn from(s: &PolicySection) -> Self {
        Self {
            refund_window_days: s.refund_window_days,
            refund_max_amount: s.refund_max_amount,
        }
    }
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self::from(&PolicySection::default())
    }
}

/// 幂等检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundDisposition {
    /// 首次出现，正常执行
    Apply,
    /// 幂等键已被消费：返回 0 金额的 duplicate 成功
    Duplicate,
}

pub fn assert_order_belongs_to_user(order: &Order, user_id: &str) -> Result<(), ToolError> {
    if order.user_id != user_id {
        return Err(ToolError::Policy(
            "Order does not belong to the current user.".to_string(),
        ));
    }
    Ok(())
}

pub fn check_refund_idempotency(order: &Order, key: Option<&str>) -> RefundDisposition {
    match key {
        Some(k) if order.used_idempotency_keys.contains(k) => RefundDisposition::Duplicate,
        _ => RefundDisposition::Apply,
    }
}

pub fn assert_not_cancelled(order: &Order) -> Result<(), ToolError> {
    if order.status == OrderStatus::Cancelled {
        return Err(ToolError::Policy(
            "Cannot refund a cancelled order via this tool.".to_string(),
        ));
    }
    Ok(())
}

/// 只有已发货 / 已送达的订单可退款
pub fn assert_refund_eligible_status(order: &Order) -> Result<(), ToolError> {
    match order.status {
        OrderStatus::Shipped | OrderStatus::Delivered => Ok(()),
        _ => Err(ToolError::Policy(
            "Order is not eligible for refund in its current status.".to_string(),
        )),
    }
}

pub fn assert_refund_within_window(
    order: &Order,
    limits: &PolicyLimits,
    now: DateTime<Utc>,
) -> Result<(), ToolError> {
    let window = Duration::days(limits.refund_window_days);
    if now - order.created_at > window {
        return Err(ToolError::Policy(format!(
            "Refund window expired ({} days).",
            limits.refund_window_days
        )));
    }
    Ok(())
}

pub fn assert_refund_amount_allowed(
    order: &Order,
    amount: f64,
    limits: &PolicyLimits,
) -> Result<(), ToolError> {
    let cap = limits.refund_max_amount;
    if amount > cap + AMOUNT_EPSILON {
        return Err(ToolError::Policy(format!(
            "Refund amount exceeds policy cap of ${cap:.2}."
        )));
    }

    let remaining = (order.total_amount - order.refunded_amount).max(0.0);
    if amount > remaining + AMOUNT_EPSILON {
        return Err(ToolError::Policy(format!(
            "Refund exceeds remaining refundable amount (${remaining:.2})."
        )));
    }
    Ok(())
}

/// 退款完整检查链：归属 -> 幂等 -> 终态 -> 状态 -> 时间窗 -> 金额
///
/// 必须在订单记录的独占更新区内调用，保证检查与扣减原子。
pub fn evaluate_refund(
    order: &Order,
    user_id: &str,
    amount: f64,
    idempotency_key: Option<&str>,
    limits: &PolicyLimits,
    now: DateTime<Utc>,
) -> Result<RefundDisposition, ToolError> {
    assert_order_belongs_to_user(order, user_id)?;
    if check_refund_idempotency(order, idempotency_key) == RefundDisposition::Duplicate {
        return Ok(RefundDisposition::Duplicate);
    }
    assert_not_cancelled(order)?;
    assert_refund_eligible_status(order)?;
    assert_refund_within_window(order, limits, now)?;
    assert_refund_amount_allowed(order, amount, limits)?;
    Ok(RefundDisposition::Apply)
}
