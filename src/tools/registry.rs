//! 工具注册表（白名单）
//!
//! 所有工具实现 Tool trait（name / description / 类型化 Input、Output / run），
//! 注册时被擦除为 `RegisteredTool`（名称 + 输入输出 Schema + handler）。
//! 只在启动时注册；请求期间注册表只读。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::tools::schema::{schema_value, ToolOutput, Validate};
use crate::tools::{ToolContext, ToolError, ToolName};

/// 类型化工具：输入在进入 run 之前已完成反序列化与 Validate
#[async_trait]
pub trait Tool: Send + Sync {
    type Input: DeserializeOwned + JsonSchema + Validate + Send + Sync;
    type Output: Serialize + JsonSchema + Into<ToolOutput> + Send;

    fn name(&self) -> ToolName;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError>;
}

/// 擦除类型后的 handler：先 validate，再由网关决定是否（以及重试几次）invoke
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// 校验参数；失败即 ValidationError，且不会调用 invoke
    fn validate(&self, args: &Value) -> Result<(), ToolError>;

    async fn invoke(&self, ctx: &ToolContext, args: &Value) -> Result<ToolOutput, ToolError>;
}

fn parse_input<I: DeserializeOwned + Validate>(args: &Value) -> Result<I, ToolError> {
    let input: I = serde_json::from_value(args.clone())
        .map_err(|e| ToolError::Validation(format!("Invalid arguments: {e}")))?;
    input
        .validate()
        .map_err(|e| ToolError::Validation(format!("Invalid arguments: {e}")))?;
    Ok(input)
}

struct TypedHandler<T>(T);

#[async_trait]
impl<T: Tool> ToolHandler for TypedHandler<T> {
    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        parse_input::<T::Input>(args).map(|_| ())
    }

    async fn invoke(&self, ctx: &ToolContext, args: &Value) -> Result<ToolOutput, ToolError> {
        let input = parse_input::<T::Input>(args)?;
        self.0.run(ctx, input).await.map(Into::into)
    }
}

/// 注册表中的一项：名称、描述、输入/输出 Schema、handler
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: ToolName,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// 工具注册表：按 ToolName 存储，同名注册覆盖旧项
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let entry = RegisteredTool {
            name: tool.name(),
            description: tool.description().to_string(),
            input_schema: schema_value::<T::Input>(),
            output_schema: schema_value::<T::Output>(),
            handler: Arc::new(TypedHandler(tool)),
        };
        self.tools.insert(entry.name, entry);
    }

    /// 按名称查找；未注册返回 NotFound
    pub fn get(&self, name: ToolName) -> Result<&RegisteredTool, ToolError> {
        self.tools
            .get(&name)
            .ok_or_else(|| ToolError::NotFound(format!("Tool not registered: {name}")))
    }

    /// 已注册工具名（按名称排序）
    pub fn names(&self) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self.tools.keys().copied().collect();
        names.sort_by_key(|n| n.as_str());
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 生成注入 prompt 的工具定义（name / description / parameters）
    pub fn to_schema_json(&self) -> String {
        self.to_schema_json_filtered(|_| true)
    }

    pub fn to_schema_json_filtered(&self, keep: impl Fn(ToolName) -> bool) -> String {
        let tools: Vec<Value> = self
            .names()
            .into_iter()
            .filter(|n| keep(*n))
            .filter_map(|n| self.tools.get(&n))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name.as_str(),
                    "description": tool.description,
                    "parameters": tool.input_schema,
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::{GetOrderStatusInput, GetOrderStatusOutput};
    use crate::tools::store::OrderStatus;
    use chrono::Utc;
    use serde_json::json;

    struct FixedOrderTool;

    #[async_trait]
    impl Tool for FixedOrderTool {
        type Input = GetOrderStatusInput;
        type Output = GetOrderStatusOutput;

        fn name(&self) -> ToolName {
            ToolName::GetOrderStatus
        }

        fn description(&self) -> &str {
            "fixed"
        }

        async fn run(&self, _ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
            Ok(GetOrderStatusOutput {
                order_id: input.order_id,
                status: OrderStatus::Processing,
                created_at: Utc::now(),
                total_amount_usd: 1.0,
                refunded_amount_usd: 0.0,
                currency: "USD".into(),
                items: vec![],
            })
        }
    }

    #[test]
    fn test_register_get_and_names() {
        let mut reg = ToolRegistry::new();
        assert!(reg.get(ToolName::GetOrderStatus).is_err());
        reg.register(FixedOrderTool);
        assert_eq!(reg.len(), 1);
        let tool = reg.get(ToolName::GetOrderStatus).unwrap();
        assert_eq!(tool.description, "fixed");
        assert!(tool.input_schema["properties"].get("order_id").is_some());
        assert_eq!(reg.names(), vec![ToolName::GetOrderStatus]);
        assert!(matches!(
            reg.get(ToolName::IssueRefund),
            Err(ToolError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_validates_before_invoke() {
        let mut reg = ToolRegistry::new();
        reg.register(FixedOrderTool);
        let handler = reg.get(ToolName::GetOrderStatus).unwrap().handler.clone();
        assert!(handler.validate(&json!({"order_id": "bad"})).is_err());
        let ctx = ToolContext::customer("u", "r");
        let out = handler
            .invoke(&ctx, &json!({"order_id": "ord_ABC123"}))
            .await
            .unwrap();
        assert!(matches!(out, ToolOutput::OrderStatus(_)));
    }

    #[test]
    fn test_schema_json_is_sorted_array() {
        let mut reg = ToolRegistry::new();
        reg.register(FixedOrderTool);
        let v: Value = serde_json::from_str(&reg.to_schema_json()).unwrap();
        assert_eq!(v[0]["name"], "get_order_status");
        assert_eq!(reg.to_schema_json_filtered(|_| false), "[]");
    }
}
