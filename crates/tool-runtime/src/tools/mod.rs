//! Built-in tool implementations for the agentic runtime.
//!
//! The personal-finance tools share one in-memory [`Ledger`]. Each acts only
//! on the book of the user given in its [`ToolContext`](crate::tool::ToolContext).

pub mod categories;
pub mod ledger;
pub mod transactions;
pub mod wallets;

use std::sync::Arc;

pub use categories::GetCategoriesTool;
pub use ledger::Ledger;
pub use transactions::{CreateTransactionTool, GetTransactionsTool};
pub use wallets::{CreateWalletTool, GetWalletsTool};

use crate::registry::{RegistryError, ToolRegistry};

/// Register every finance tool against a shared ledger.
pub fn register_finance_tools(registry: &mut ToolRegistry, ledger: Arc<Ledger>) -> Result<(), RegistryError> {
    registry.register(GetWalletsTool::new(ledger.clone()))?;
    registry.register(CreateWalletTool::new(ledger.clone()))?;
    registry.register(GetCategoriesTool)?;
    registry.register(CreateTransactionTool::new(ledger.clone()))?;
    registry.register(GetTransactionsTool::new(ledger))?;
    Ok(())
}
