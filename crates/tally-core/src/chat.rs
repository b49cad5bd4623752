//! Conversational questions about the user's finances
//!
//! The bridge is stateless: the caller stores the conversation and passes it
//! in. Only a bounded window of history and a bounded summary of the
//! transactions reach the model.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::info;

use crate::ai::{AIBackend, ProviderRouter};
use crate::error::Result;
use crate::models::{normalize_currency, Category, ChatTurn, Transaction};
use crate::prompts::{render_shared, PromptId, SharedPrompts};

/// Most recent transactions listed in a rendered summary
const RECENT_LIMIT: usize = 10;
/// Expense/income ratio (percent) above which the summary warns
const RATIO_WARNING_PCT: f64 = 80.0;

/// The last `limit` turns of a conversation
pub fn history_window(history: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(limit)..]
}

/// Answers questions with the provider router's chat path
#[derive(Clone)]
pub struct ChatBridge {
    router: ProviderRouter,
    prompts: SharedPrompts,
    history_limit: usize,
    home_currency: String,
}

impl ChatBridge {
    pub fn new(
        router: ProviderRouter,
        prompts: SharedPrompts,
        history_limit: usize,
        home_currency: &str,
    ) -> Self {
        Self {
            router,
            prompts,
            history_limit,
            home_currency: normalize_currency(home_currency),
        }
    }

    /// Ask one question
    ///
    /// Sends the system text (with `financial_context` embedded), the last
    /// `history_limit` turns and the new question.
    pub async fn ask(
        &self,
        question: &str,
        financial_context: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let system = render_shared(&self.prompts, PromptId::FinanceChat, |p| {
            let mut vars = HashMap::new();
            vars.insert("context", financial_context);
            vars.insert("home_currency", self.home_currency.as_str());
            p.render_system(&vars)
        })?;

        let window = history_window(history, self.history_limit);
        let mut turns = Vec::with_capacity(window.len() + 1);
        turns.extend_from_slice(window);
        turns.push(ChatTurn::user(question));

        info!(
            "Chat question via {} ({} of {} history turns)",
            self.router.text_provider().provider(),
            window.len(),
            history.len()
        );
        self.router.complete_chat(&system, &turns).await
    }
}

/// Aggregate view of a set of transactions
///
/// Amounts are summed as given, so convert to one currency first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub currency: String,
    pub transaction_count: usize,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net: f64,
    /// Expense totals per category, largest first
    pub expenses_by_category: Vec<CategoryTotal>,
    pub top_category: Option<CategoryTotal>,
    /// Share of all expenses taken by the top category, in percent
    pub top_category_share: Option<f64>,
    pub average_expense: Option<f64>,
    /// Expenses above the 90th percentile of expense amounts
    pub unusual_expenses: usize,
    /// Expenses as a percentage of income
    pub expense_ratio: Option<f64>,
    /// Newest first
    pub recent: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: f64,
}

impl FinancialSummary {
    pub fn from_transactions(transactions: &[Transaction], currency: &str) -> Self {
        let expenses: Vec<&Transaction> = transactions.iter().filter(|t| t.is_expense()).collect();
        let total_income: f64 = transactions
            .iter()
            .filter(|t| t.is_income())
            .map(|t| t.amount)
            .sum();
        let total_expenses: f64 = expenses.iter().map(|t| t.amount).sum();

        let mut per_category: BTreeMap<Category, f64> = BTreeMap::new();
        for tx in &expenses {
            *per_category.entry(tx.category).or_default() += tx.amount;
        }
        let mut expenses_by_category: Vec<CategoryTotal> = per_category
            .into_iter()
            .map(|(category, total)| CategoryTotal { category, total })
            .collect();
        // Stable sort keeps category order among equal totals
        expenses_by_category.sort_by(|a, b| b.total.total_cmp(&a.total));

        let top_category = expenses_by_category.first().copied();
        let top_category_share = top_category
            .filter(|_| total_expenses > 0.0)
            .map(|top| top.total / total_expenses * 100.0);

        let average_expense =
            (!expenses.is_empty()).then(|| total_expenses / expenses.len() as f64);

        let amounts: Vec<f64> = expenses.iter().map(|t| t.amount).collect();
        let unusual_expenses = match quantile(&amounts, 0.9) {
            Some(q) => amounts.iter().filter(|a| **a > q).count(),
            None => 0,
        };

        let expense_ratio = (total_income > 0.0 && !expenses.is_empty())
            .then(|| total_expenses / total_income * 100.0);

        let mut recent: Vec<Transaction> = transactions.to_vec();
        recent.sort_by(|a, b| b.date.cmp(&a.date));
        recent.truncate(RECENT_LIMIT);

        Self {
            currency: normalize_currency(currency),
            transaction_count: transactions.len(),
            total_income,
            total_expenses,
            net: total_income - total_expenses,
            expenses_by_category,
            top_category,
            top_category_share,
            average_expense,
            unusual_expenses,
            expense_ratio,
            recent,
        }
    }

    /// Expenses above 80% of income
    pub fn budget_warning(&self) -> bool {
        self.expense_ratio.is_some_and(|r| r > RATIO_WARNING_PCT)
    }

    /// Text context for the chat prompt
    ///
    /// Fixed header lines, at most one line per category, at most ten
    /// recent transactions.
    pub fn render(&self) -> String {
        let c = &self.currency;
        let mut out = String::new();

        let _ = writeln!(out, "Currency: {}", c);
        let _ = writeln!(out, "Transactions: {}", self.transaction_count);
        let _ = writeln!(out, "Total income: {:.2} {}", self.total_income, c);
        let _ = writeln!(out, "Total expenses: {:.2} {}", self.total_expenses, c);
        let _ = writeln!(out, "Net: {:.2} {}", self.net, c);

        if !self.expenses_by_category.is_empty() {
            let _ = writeln!(out, "Expenses by category:");
            for entry in &self.expenses_by_category {
                let _ = writeln!(out, "- {}: {:.2} {}", entry.category, entry.total, c);
            }
        }

        if let (Some(top), Some(share)) = (self.top_category, self.top_category_share) {
            let _ = writeln!(
                out,
                "Top expense category: {} ({:.0}% of expenses)",
                top.category, share
            );
        }
        if let Some(avg) = self.average_expense {
            let _ = writeln!(out, "Average expense: {:.2} {}", avg, c);
        }
        if self.unusual_expenses > 0 {
            let _ = writeln!(out, "Unusually large expenses: {}", self.unusual_expenses);
        }
        if let Some(ratio) = self.expense_ratio {
            let _ = writeln!(out, "Expenses are {:.0}% of income", ratio);
            if self.budget_warning() {
                let _ = writeln!(out, "Warning: expenses exceed 80% of income");
            }
        }

        if !self.recent.is_empty() {
            let _ = writeln!(out, "Recent transactions:");
            for tx in &self.recent {
                let _ = writeln!(
                    out,
                    "- {} {} {:.2} {} {}: {}",
                    tx.date, tx.kind, tx.amount, tx.currency, tx.category, tx.description
                );
            }
        }

        out.trim_end().to_string()
    }
}

/// Linear-interpolated quantile (numpy/pandas default)
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
