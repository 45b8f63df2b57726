use async_trait::async_trait;
use serde_json::Value;

use super::ledger::{TransactionKind, SYSTEM_CATEGORIES};
use crate::tool::{optional_str, Tool, ToolContext, ToolDefinition, ToolError, ToolOutcome};

/// List the transaction categories, optionally filtered by type.
pub struct GetCategoriesTool;

#[async_trait]
impl Tool for GetCategoriesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_categories".to_string(),
            description: "Get the list of available transaction categories for the user. Use this tool when you need to know the valid categories to create a transaction.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["income", "expense"],
                        "description": "Filter categories by type (optional)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let kind = match optional_str(&input, "type") {
            Some(raw) => Some(
                TransactionKind::parse(raw)
                    .ok_or_else(|| ToolError::InvalidInput(format!("unknown category type '{raw}'")))?,
            ),
            None => None,
        };

        let mut list = String::from("Available Categories:\n");
        for category in SYSTEM_CATEGORIES
            .iter()
            .filter(|c| kind.map_or(true, |k| c.kind == k))
        {
            let label = match category.kind {
                TransactionKind::Income => "Income",
                TransactionKind::Expense => "Expense",
            };
            list.push_str(&format!("- {} ({label})\n", category.name));
        }
        Ok(ToolOutcome::success(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filter_by_type() {
        let ctx = ToolContext { user_id: 1 };
        let out = GetCategoriesTool
            .execute(serde_json::json!({"type": "income"}), &ctx)
            .await
            .unwrap();
        assert!(out.content.contains("- Salary (Income)"));
        assert!(!out.content.contains("(Expense)"));

        let all = GetCategoriesTool.execute(serde_json::json!({}), &ctx).await.unwrap();
        assert_eq!(all.content.lines().count(), 1 + SYSTEM_CATEGORIES.len());
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let ctx = ToolContext { user_id: 1 };
        let err = GetCategoriesTool
            .execute(serde_json::json!({"type": "refund"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
