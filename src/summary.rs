//! Per-loan figures for list and detail views.

use chrono::NaiveDate;
use log::warn;
use std::fmt;

use crate::balance::{outstanding_balance, total_received};
use crate::calendar::client_name;
use crate::loan::{Client, Loan, LoanStatus, Payment, PaymentType, Receipt};
use crate::schedule::next_due_date;
use crate::status::{classify_slots, derive_status, SlotState};

/// Inconsistencies surfaced to the operator, never corrected automatically.
#[derive(Clone, PartialEq, Debug)]
pub enum Warning {
    /// Stored as completed while money is still owed.
    CompletedWithBalance { loan_id: String, balance: f64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::CompletedWithBalance { loan_id, balance } => write!(
                f,
                "loan {} is marked completed but still has ${:.2} outstanding",
                loan_id, balance
            ),
        }
    }
}

/// Checks a loan's stored status against its outstanding balance.
pub fn consistency_warning(loan: &Loan, outstanding: f64) -> Option<Warning> {
    if loan.status == LoanStatus::Completed && outstanding > 0. {
        let warning = Warning::CompletedWithBalance {
            loan_id: loan.id.clone(),
            balance: outstanding,
        };
        warn!("{}", warning);
        Some(warning)
    } else {
        None
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct LoanSummary {
    pub loan_id: String,
    pub client_name: String,
    pub payment_type: PaymentType,
    pub stored_status: LoanStatus,
    /// Status as derived from receipts, payments and the calendar.
    pub status: LoanStatus,
    pub has_overdue: bool,
    pub total_with_interest: f64,
    pub total_received: f64,
    pub outstanding: f64,
    pub paid_slots: usize,
    pub slot_count: usize,
    pub next_due: Option<NaiveDate>,
    pub warnings: Vec<Warning>,
}

impl fmt::Display for LoanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) {}: paid {}/{}, received ${:.2} of ${:.2}, outstanding ${:.2}",
            self.loan_id,
            self.client_name,
            self.payment_type,
            self.status,
            self.paid_slots,
            self.slot_count,
            self.total_received,
            self.total_with_interest,
            self.outstanding
        )?;
        if let Some(next) = self.next_due {
            write!(f, ", next due {}", next)?;
        }
        Ok(())
    }
}

pub fn summarize(
    loan: &Loan,
    clients: &[Client],
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> LoanSummary {
    let slots = classify_slots(loan, receipts, payments, today);
    let has_overdue = slots.iter().any(|s| s.state == SlotState::Overdue);
    let status = derive_status(loan, receipts, payments, today);
    let outstanding = outstanding_balance(loan, receipts, payments);

    LoanSummary {
        loan_id: loan.id.clone(),
        client_name: client_name(clients, &loan.client_id),
        payment_type: loan.payment_type,
        stored_status: loan.status,
        status,
        has_overdue,
        total_with_interest: loan.total_with_interest(),
        total_received: total_received(loan, receipts, payments),
        outstanding,
        paid_slots: slots.iter().filter(|s| s.state == SlotState::Paid).count(),
        slot_count: slots.len(),
        next_due: next_due_date(loan, receipts, payments),
        warnings: consistency_warning(loan, outstanding).into_iter().collect(),
    }
}

/// Status selector of the loan list.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Not completed and nothing overdue.
    Active,
    Completed,
    /// Anything with an overdue slot.
    Defaulted,
}

impl StatusFilter {
    pub fn matches(self, summary: &LoanSummary) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => summary.status == LoanStatus::Active,
            StatusFilter::Completed => summary.status == LoanStatus::Completed,
            StatusFilter::Defaulted => summary.has_overdue,
        }
    }
}

/// Summaries of the loans passing `filter` whose client name contains
/// `search`, ignoring case.
pub fn list_loans(
    loans: &[Loan],
    clients: &[Client],
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
    filter: StatusFilter,
    search: &str,
) -> Vec<LoanSummary> {
    let needle = search.trim().to_lowercase();
    loans
        .iter()
        .map(|loan| summarize(loan, clients, receipts, payments, today))
        .filter(|s| filter.matches(s))
        .filter(|s| s.client_name.to_lowercase().contains(&needle))
        .collect()
}
