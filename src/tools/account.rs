//! 账户工具：联系方式变更、密码重置

use std::sync::Arc;

use async_trait::async_trait;

use crate::tools::schema::{
    InitiatePasswordResetInput, InitiatePasswordResetOutput, UpdateContactInput,
    UpdateContactOutput,
};
use crate::tools::store::RecordStore;
use crate::tools::{Tool, ToolContext, ToolError, ToolName};

/// update_contact：只能修改当前用户自己的联系方式
pub struct UpdateContactTool {
    store: Arc<RecordStore>,
}

impl UpdateContactTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateContactTool {
    type Input = UpdateContactInput;
    type Output = UpdateContactOutput;

    fn name(&self) -> ToolName {
        ToolName::UpdateContact
    }

    fn description(&self) -> &str {
        "Update the authenticated customer's contact email and/or phone (E.164). \
         Args: {\"new_email\": \"...\", \"new_phone_e164\": \"+1...\"}"
    }

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        self.store.update_user(ctx.user_id(), |user| {
            if let Some(email) = input.new_email {
                user.email = email;
            }
            if let Some(phone) = input.new_phone_e164 {
                user.phone = Some(phone);
            }
            Ok(UpdateContactOutput {
                user_id: user.user_id.clone(),
                updated_email: Some(user.email.clone()),
                updated_phone_e164: user.phone.clone(),
                message: "Contact information updated.".to_string(),
            })
        })
    }
}

/// initiate_password_reset：邮箱必须与当前用户一致（忽略大小写）
pub struct InitiatePasswordResetTool {
    store: Arc<RecordStore>,
}

impl InitiatePasswordResetTool {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for InitiatePasswordResetTool {
    type Input = InitiatePasswordResetInput;
    type Output = InitiatePasswordResetOutput;

    fn name(&self) -> ToolName {
        ToolName::InitiatePasswordReset
    }

    fn description(&self) -> &str {
        "Send a password reset email to the authenticated customer's address. \
         Args: {\"email\": \"...\"}"
    }

    async fn run(&self, ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        let user = self
            .store
            .get_user(ctx.user_id())
            .ok_or_else(|| ToolError::Validation("User not found.".to_string()))?;

        if !user.email.eq_ignore_ascii_case(&input.email) {
            return Err(ToolError::Policy(
                "Password reset can only be initiated for the authenticated user's email."
                    .to_string(),
            ));
        }

        // 真实环境在此投递邮件任务；令牌永远不返回给调用方
        tracing::info!(user_id = %user.user_id, "Password reset initiated");

        Ok(InitiatePasswordResetOutput {
            email: user.email,
            initiated: true,
            message: "Password reset email has been sent if the account exists.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_contact_changes_only_given_fields() {
        let store = Arc::new(RecordStore::seeded());
        let tool = UpdateContactTool::new(store.clone());
        let ctx = ToolContext::customer("user_123", "req_1");
        let out = tool
            .run(
                &ctx,
                UpdateContactInput { new_email: None, new_phone_e164: Some("+442071838750".into()) },
            )
            .await
            .unwrap();
        assert_eq!(out.updated_phone_e164.as_deref(), Some("+442071838750"));
        let user = store.get_user("user_123").unwrap();
        assert_eq!(user.email, "customer@example.com");
        assert_eq!(user.phone.as_deref(), Some("+442071838750"));
    }

    #[tokio::test]
    async fn test_update_contact_unknown_user() {
        let tool = UpdateContactTool::new(Arc::new(RecordStore::seeded()));
        let ctx = ToolContext::customer("user_999", "req_1");
        let err = tool
            .run(&ctx, UpdateContactInput { new_email: Some("x@y.io".into()), new_phone_e164: None })
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Validation("User not found.".into()));
    }

    #[tokio::test]
    async fn test_password_reset_email_must_match() {
        let tool = InitiatePasswordResetTool::new(Arc::new(RecordStore::seeded()));
        let ctx = ToolContext::customer("user_123", "req_1");

        let ok = tool
            .run(&ctx, InitiatePasswordResetInput { email: "Customer@Example.com".into() })
            .await
            .unwrap();
        assert!(ok.initiated);

        let err = tool
            .run(&ctx, InitiatePasswordResetInput { email: "someone@else.com".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Policy(_)));
    }
}
