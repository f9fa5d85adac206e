//! 工具输入/输出 Schema（schemars 自动生成 JSON Schema，注入推理 prompt）
//!
//! 输入一律 `deny_unknown_fields`，反序列化之后再跑 [`Validate`] 做格式与跨字段约束；
//! 任何一步失败都是 ValidationError，不会到达 handler。

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::tools::store::{OrderStatus, ShipmentStatus};

/// 反序列化之后的业务格式校验
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn order_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ord_[a-zA-Z0-9]{6,32}$").expect("valid order id regex"))
}

fn tracking_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^trk_[a-zA-Z0-9]{6,32}$").expect("valid tracking id regex"))
}

fn e164_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+[1-9]\d{6,14}$").expect("valid e164 regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("valid email regex")
    })
}

fn check_order_id(id: &str) -> Result<(), String> {
    if order_id_re().is_match(id) {
        Ok(())
    } else {
        Err(format!("order_id '{id}' must match ord_<6-32 alphanumerics>"))
    }
}

fn check_tracking_id(id: &str) -> Result<(), String> {
    if tracking_id_re().is_match(id) {
        Ok(())
    } else {
        Err(format!("tracking_id '{id}' must match trk_<6-32 alphanumerics>"))
    }
}

fn check_email(field: &str, email: &str) -> Result<(), String> {
    if email_re().is_match(email) {
        Ok(())
    } else {
        Err(format!("{field} is not a valid email address"))
    }
}

/// 返回类型的 JSON Schema（Value 形式）
pub fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}))
}

// ---- get_order_status ----

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetOrderStatusInput {
    /// 订单号，如 ord_XYZ78901
    pub order_id: String,
}

impl Validate for GetOrderStatusInput {
    fn validate(&self) -> Result<(), String> {
        check_order_id(&self.order_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OrderLineItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetOrderStatusOutput {
    pub order_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub total_amount_usd: f64,
    pub refunded_amount_usd: f64,
    pub currency: String,
    pub items: Vec<OrderLineItem>,
}

// ---- track_shipment ----

/// tracking_id 与 order_id 至少提供一个
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TrackShipmentInput {
    #[serde(default)]
    pub tracking_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl Validate for TrackShipmentInput {
    fn validate(&self) -> Result<(), String> {
        if self.tracking_id.is_none() && self.order_id.is_none() {
            return Err("Provide either tracking_id or order_id.".to_string());
        }
        if let Some(t) = &self.tracking_id {
            check_tracking_id(t)?;
        }
        if let Some(o) = &self.order_id {
            check_order_id(o)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackShipmentOutput {
    pub tracking_id: String,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

// ---- issue_refund ----

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IssueRefundInput {
    pub order_id: String,
    /// 退款金额（美元，> 0）
    pub amount_usd: f64,
    /// 退款原因（3..=240 字符）
    pub reason: String,
    /// 可选幂等键：同一请求重复提交不会重复退款
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl Validate for IssueRefundInput {
    fn validate(&self) -> Result<(), String> {
        check_order_id(&self.order_id)?;
        if !self.amount_usd.is_finite() || self.amount_usd <= 0.0 {
            return Err("amount_usd must be greater than 0".to_string());
        }
        let len = self.reason.chars().count();
        if !(3..=240).contains(&len) {
            return Err("reason must be between 3 and 240 characters".to_string());
        }
        if let Some(k) = &self.idempotency_key {
            if k.trim().is_empty() {
                return Err("idempotency_key must not be blank".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IssueRefundOutput {
    pub order_id: String,
    pub approved: bool,
    pub refunded_amount_usd: f64,
    pub currency: String,
    pub refund_id: String,
    pub message: String,
}

// ---- update_contact ----

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateContactInput {
    #[serde(default)]
    pub new_email: Option<String>,
    /// E.164 格式手机号，如 +14155552671
    #[serde(default)]
    pub new_phone_e164: Option<String>,
}

impl Validate for UpdateContactInput {
    fn validate(&self) -> Result<(), String> {
        if self.new_email.is_none() && self.new_phone_e164.is_none() {
            return Err("Provide at least one of new_email or new_phone_e164.".to_string());
        }
        if let Some(e) = &self.new_email {
            check_email("new_email", e)?;
        }
        if let Some(p) = &self.new_phone_e164 {
            if !e164_re().is_match(p) {
                return Err("new_phone_e164 must be in E.164 format, e.g. +14155552671".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateContactOutput {
    pub user_id: String,
    pub updated_email: Option<String>,
    pub updated_phone_e164: Option<String>,
    pub message: String,
}

// ---- initiate_password_reset ----

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InitiatePasswordResetInput {
    pub email: String,
}

impl Validate for InitiatePasswordResetInput {
    fn validate(&self) -> Result<(), String> {
        check_email("email", &self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InitiatePasswordResetOutput {
    pub email: String,
    pub initiated: bool,
    pub message: String,
}

// ---- search_knowledge_base ----

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchKnowledgeBaseInput {
    pub query: String,
}

impl Validate for SearchKnowledgeBaseInput {
    fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeHit {
    /// 引用编号，回答中以 [n] 引用
    pub n: usize,
    pub citation: String,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchKnowledgeBaseOutput {
    pub results: Vec<KnowledgeHit>,
}

/// 所有工具输出的封闭和类型（序列化时不带标签，直接是各工具的输出对象）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    OrderStatus(GetOrderStatusOutput),
    Shipment(TrackShipmentOutput),
    Refund(IssueRefundOutput),
    Contact(UpdateContactOutput),
    PasswordReset(InitiatePasswordResetOutput),
    KnowledgeBase(SearchKnowledgeBaseOutput),
}

impl ToolOutput {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

macro_rules! impl_into_output {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ToolOutput {
            fn from(v: $ty) -> Self {
                ToolOutput::$variant(v)
            }
        })*
    };
}

impl_into_output!(
    GetOrderStatusOutput => OrderStatus,
    TrackShipmentOutput => Shipment,
    IssueRefundOutput => Refund,
    UpdateContactOutput => Contact,
    InitiatePasswordResetOutput => PasswordReset,
    SearchKnowledgeBaseOutput => KnowledgeBase,
);
