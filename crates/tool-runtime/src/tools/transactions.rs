use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;

use super::ledger::{format_amount, resolve_category, Ledger, Transaction, TransactionKind};
use crate::tool::{optional_str, Tool, ToolContext, ToolDefinition, ToolError, ToolOutcome};

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 50;

fn parse_date(input: &Value, key: &str) -> Result<Option<NaiveDate>, ToolError> {
    optional_str(input, key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ToolError::InvalidInput(format!("'{key}' must be YYYY-MM-DD, got '{raw}'")))
        })
        .transpose()
}

fn parse_kind(input: &Value) -> Result<Option<TransactionKind>, ToolError> {
    optional_str(input, "type")
        .map(|raw| {
            TransactionKind::parse(raw)
                .ok_or_else(|| ToolError::InvalidInput(format!("'type' must be income or expense, got '{raw}'")))
        })
        .transpose()
}

/// Record an income or expense against one of the user's wallets.
pub struct CreateTransactionTool {
    ledger: Arc<Ledger>,
}

impl CreateTransactionTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for CreateTransactionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_transaction".to_string(),
            description: "Create a new financial transaction (income or expense). Use this when the user wants to record a transaction.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "amount": {
                        "type": "number",
                        "description": "Transaction amount"
                    },
                    "note": {
                        "type": "string",
                        "description": "Note/Description for the transaction"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["income", "expense"],
                        "description": "Transaction type: income or expense"
                    },
                    "category": {
                        "type": "string",
                        "description": "Category name. IMPORTANT: You MUST use get_categories first to find a valid category name."
                    },
                    "wallet": {
                        "type": "string",
                        "description": "Wallet name. IMPORTANT: You MUST use get_wallets first to find a valid wallet name."
                    },
                    "date": {
                        "type": "string",
                        "description": "Transaction date in YYYY-MM-DD format."
                    }
                },
                "required": ["amount", "type", "category", "wallet"]
            }),
        }
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["get_categories", "get_wallets"]
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let amount = input.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        if amount <= 0.0 {
            return Ok(ToolOutcome::failure("Amount must be greater than 0"));
        }
        let kind = parse_kind(&input)?.unwrap_or(TransactionKind::Expense);
        let date = parse_date(&input, "date")?.unwrap_or_else(|| Utc::now().date_naive());
        let note = optional_str(&input, "note").unwrap_or_default().to_string();
        let wallet_hint = optional_str(&input, "wallet");

        let Some(category) = resolve_category(kind, optional_str(&input, "category")) else {
            return Ok(ToolOutcome::failure("Category not found. Please try again."));
        };

        let outcome = self
            .ledger
            .write(context.user_id, |book| {
                let Some(wallet) = book.resolve_wallet(wallet_hint) else {
                    return ToolOutcome::failure("User has no wallet. Create one with create_wallet first.");
                };
                let currency = book.wallets[wallet].currency.clone();
                let tx = book.record(
                    wallet,
                    Transaction {
                        id: 0,
                        wallet: String::new(),
                        category: category.name.to_string(),
                        kind,
                        amount,
                        note,
                        date,
                    },
                );
                debug!(id = tx.id, wallet = %tx.wallet, "recorded transaction");

                let mut text = format!(
                    "Created {kind} transaction for {} {currency} in wallet '{}' under category '{}'",
                    format_amount(amount),
                    tx.wallet,
                    tx.category
                );
                if !tx.note.is_empty() {
                    text.push_str(&format!(" (Note: {})", tx.note));
                }
                ToolOutcome::success(text)
            })
            .await;
        Ok(outcome)
    }
}

/// List recent transactions, newest first, with optional filters.
pub struct GetTransactionsTool {
    ledger: Arc<Ledger>,
}

impl GetTransactionsTool {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for GetTransactionsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_transactions".to_string(),
            description: "Get a list of user transactions. Use this tool to view transaction history with filters like date range, type, or category.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format"
                    },
                    "type": {
                        "type": "string",
                        "enum": ["income", "expense"],
                        "description": "Filter by transaction type"
                    },
                    "category": {
                        "type": "string",
                        "description": "Filter by category name"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of transactions to return (default: 10)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let start = parse_date(&input, "start_date")?;
        let end = parse_date(&input, "end_date")?;
        let kind = parse_kind(&input)?;
        let category = optional_str(&input, "category").map(str::to_lowercase);
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT) as usize;

        let text = self
            .ledger
            .read(context.user_id, |book| {
                let mut matches: Vec<&Transaction> = book
                    .transactions
                    .iter()
                    .filter(|tx| start.map_or(true, |d| tx.date >= d))
                    .filter(|tx| end.map_or(true, |d| tx.date <= d))
                    .filter(|tx| kind.map_or(true, |k| tx.kind == k))
                    .filter(|tx| {
                        category
                            .as_deref()
                            .map_or(true, |c| tx.category.to_lowercase().contains(c))
                    })
                    .collect();
                if matches.is_empty() {
                    return "No transactions found with the given filters.".to_string();
                }
                matches.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

                let mut list = String::from("Transactions:\n");
                for tx in matches.into_iter().take(limit) {
                    let sign = match tx.kind {
                        TransactionKind::Income => '+',
                        TransactionKind::Expense => '-',
                    };
                    list.push_str(&format!(
                        "{sign} {}: {} - {} [{}]",
                        tx.date.format("%d/%m"),
                        format_amount(tx.amount),
                        tx.category,
                        tx.wallet
                    ));
                    if !tx.note.is_empty() {
                        list.push_str(&format!(" ({})", tx.note));
                    }
                    list.push('\n');
                }
                list
            })
            .await;
        Ok(ToolOutcome::success(text))
    }
}
