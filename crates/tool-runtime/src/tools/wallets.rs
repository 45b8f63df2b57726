use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::ledger::{format_amount, Ledger};
use crate::tool::{optional_str, required_str, Tool, ToolContext, ToolDefinition, ToolError, ToolOutcome};

/// List the user's wallets with balances and per-currency totals.
pub struct GetWalletsTool {
    ledger: Arc<Ledger>,
}

impl GetWalletsTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for GetWalletsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_wallets".to_string(),
            description: "Get the list of user wallets with their current balance. Use this to check available funds or select a wallet for transactions.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn execute(&self, _input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let text = self
            .ledger
            .read(context.user_id, |book| {
                if book.wallets.is_empty() {
                    return "No wallets found. Please create a wallet first.".to_string();
                }

                let mut list = String::from("Wallets:\n");
                let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
                for wallet in &book.wallets {
                    let marker = if wallet.is_default { " (default)" } else { "" };
                    list.push_str(&format!(
                        "- {}: {} {}{}\n",
                        wallet.name,
                        format_amount(wallet.balance),
                        wallet.currency,
                        marker
                    ));
                    *totals.entry(wallet.currency.as_str()).or_default() += wallet.balance;
                }
                let totals: Vec<_> = totals
                    .iter()
                    .map(|(currency, total)| format!("{} {currency}", format_amount(*total)))
                    .collect();
                list.push_str(&format!("\nTotal: {}", totals.join(" | ")));
                list
            })
            .await;
        Ok(ToolOutcome::success(text))
    }
}

pub struct CreateWalletTool {
    ledger: Arc<Ledger>,
}

impl CreateWalletTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateWalletTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_wallet".to_string(),
            description: "Create a new wallet for the user. Useful for organizing finances (e.g., separate wallet for savings, daily expenses).".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name of the wallet (e.g., \"Savings\", \"Cash\")"
                    },
                    "initial_balance": {
                        "type": "number",
                        "description": "Initial balance (default: 0)"
                    },
                    "currency": {
                        "type": "string",
                        "description": "Currency code (default: VND)"
                    }
                },
                "required": ["name"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let name = required_str(&input, "name")?.trim();
        let balance = input.get("initial_balance").and_then(Value::as_f64).unwrap_or(0.0);
        let currency = optional_str(&input, "currency").unwrap_or("VND");
        debug!(user_id = context.user_id, name, balance, currency, "creating wallet");

        let created = self
            .ledger
            .write(context.user_id, |book| book.add_wallet(name, balance, currency).is_some())
            .await;

        if !created {
            return Ok(ToolOutcome::failure(format!("A wallet named '{name}' already exists.")));
        }
        Ok(ToolOutcome::success(format!(
            "Created wallet '{name}' with balance {} {currency}.",
            format_amount(balance)
        )))
    }
}
