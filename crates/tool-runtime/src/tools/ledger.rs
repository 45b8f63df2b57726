//! In-memory personal ledger backing the finance tools.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use oikos_core::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub name: &'static str,
    pub kind: TransactionKind,
}

const fn category(name: &'static str, kind: TransactionKind) -> Category {
    Category { name, kind }
}

/// Categories available to every user.
pub const SYSTEM_CATEGORIES: &[Category] = &[
    category("Salary", TransactionKind::Income),
    category("Freelance", TransactionKind::Income),
    category("Investment", TransactionKind::Income),
    category("Gifts", TransactionKind::Income),
    category("Bonus", TransactionKind::Income),
    category("Other income", TransactionKind::Income),
    category("Food & Drinks", TransactionKind::Expense),
    category("Groceries", TransactionKind::Expense),
    category("Transport", TransactionKind::Expense),
    category("Bills & Utilities", TransactionKind::Expense),
    category("Rent", TransactionKind::Expense),
    category("Shopping", TransactionKind::Expense),
    category("Entertainment", TransactionKind::Expense),
    category("Health", TransactionKind::Expense),
    category("Education", TransactionKind::Expense),
    category("Travel", TransactionKind::Expense),
    category("Subscriptions", TransactionKind::Expense),
    category("Other expenses", TransactionKind::Expense),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub balance: f64,
    pub currency: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub wallet: String,
    pub category: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub note: String,
    pub date: NaiveDate,
}

/// One user's wallets and transactions.
#[derive(Debug, Default)]
pub struct Book {
    pub wallets: Vec<Wallet>,
    pub transactions: Vec<Transaction>,
}

impl Book {
    /// Add a wallet; the user's first wallet becomes the default.
    /// Returns `None` if a wallet with the same name exists.
    pub fn add_wallet(&mut self, name: &str, balance: f64, currency: &str) -> Option<&Wallet> {
        if self.wallets.iter().any(|w| w.name.eq_ignore_ascii_case(name)) {
            return None;
        }
        let is_default = self.wallets.is_empty();
        self.wallets.push(Wallet {
            name: name.to_string(),
            balance,
            currency: currency.to_string(),
            is_default,
        });
        self.wallets.last()
    }

    /// Find a wallet by partial name, falling back to the default wallet
    /// and then to the first one.
    pub fn resolve_wallet(&self, hint: Option<&str>) -> Option<usize> {
        hint.and_then(|h| find_partial(self.wallets.iter().map(|w| w.name.as_str()), h))
            .or_else(|| self.wallets.iter().position(|w| w.is_default))
            .or(if self.wallets.is_empty() { None } else { Some(0) })
    }

    /// Record a transaction against a wallet and adjust its balance.
    pub fn record(&mut self, wallet: usize, mut transaction: Transaction) -> &Transaction {
        let target = &mut self.wallets[wallet];
        match transaction.kind {
            TransactionKind::Income => target.balance += transaction.amount,
            TransactionKind::Expense => target.balance -= transaction.amount,
        }
        transaction.wallet = target.name.clone();
        transaction.id = self.transactions.len() as u64 + 1;
        self.transactions.push(transaction);
        &self.transactions[self.transactions.len() - 1]
    }
}

/// Find a category of the given kind by partial name, falling back to the
/// kind's catch-all "Other ..." category.
pub fn resolve_category(kind: TransactionKind, hint: Option<&str>) -> Option<&'static Category> {
    let candidates: Vec<&'static Category> = SYSTEM_CATEGORIES.iter().filter(|c| c.kind == kind).collect();
    hint.and_then(|h| find_partial(candidates.iter().map(|c| c.name), h))
        .or_else(|| candidates.iter().position(|c| c.name.starts_with("Other")))
        .or(if candidates.is_empty() { None } else { Some(0) })
        .map(|i| candidates[i])
}

/// Exact case-insensitive match first, then substring match.
fn find_partial<'a>(names: impl Iterator<Item = &'a str> + Clone, hint: &str) -> Option<usize> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }
    names
        .clone()
        .position(|n| n.to_lowercase() == hint)
        .or_else(|| names.clone().position(|n| n.to_lowercase().contains(&hint)))
}

/// Shared store of every user's book.
#[derive(Default)]
pub struct Ledger {
    books: RwLock<HashMap<UserId, Book>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read<R>(&self, user_id: UserId, f: impl FnOnce(&Book) -> R) -> R {
        let books = self.books.read().await;
        match books.get(&user_id) {
            Some(book) => f(book),
            None => f(&Book::default()),
        }
    }

    pub async fn write<R>(&self, user_id: UserId, f: impl FnOnce(&mut Book) -> R) -> R {
        let mut books = self.books.write().await;
        f(books.entry(user_id).or_default())
    }
}

/// Format an amount without decimals, using `.` as thousands separator.
pub fn format_amount(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}
