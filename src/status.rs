use chrono::NaiveDate;
use log::{debug, trace};
use std::fmt;

use crate::loan::{Loan, LoanStatus, Payment, PaymentType, Receipt};
use crate::schedule::generate_schedule;

/// Slack allowed when comparing amounts received against amounts owed.
pub const AMOUNT_TOLERANCE: f64 = 0.005;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotState {
    Paid,
    Overdue,
    Pending,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Paid => "paid",
            SlotState::Overdue => "overdue",
            SlotState::Pending => "pending",
        };
        f.write_str(name)
    }
}

/// One classified entry of a loan's schedule.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Slot {
    /// 1-based position in the schedule.
    pub number: u32,
    pub due: NaiveDate,
    pub state: SlotState,
    /// Presentation tag only; never changes `state`.
    pub due_today: bool,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}, due {}, {}", self.number, self.due, self.state)?;
        if self.due_today {
            write!(f, " (today)")?;
        }
        Ok(())
    }
}

/// Whether the loan's receipts satisfy slot `number` falling on `due`.
///
/// Installments and diario pair the n-th receipt with the n-th slot; every
/// other modality needs a receipt dated on the slot's day.
pub(crate) fn receipt_covers(
    loan: &Loan,
    number: u32,
    due: NaiveDate,
    loan_receipts: &[&Receipt],
) -> bool {
    if loan.payment_type.is_positional() {
        loan_receipts.len() >= number as usize
    } else {
        loan_receipts.iter().any(|r| r.date == Some(due))
    }
}

/// Classifies every slot of the loan's schedule as of `today`.
pub fn classify_slots(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> Vec<Slot> {
    let loan_receipts = loan.receipts_in(receipts);
    let completed = loan.status == LoanStatus::Completed;

    generate_schedule(loan, receipts, payments)
        .into_iter()
        .zip(1u32..)
        .map(|(due, number)| {
            let covered = receipt_covers(loan, number, due, &loan_receipts);
            let paid = match loan.payment_type {
                PaymentType::InterestOnly => covered || completed,
                _ => covered,
            };
            let state = if paid {
                SlotState::Paid
            } else if !completed && due < today {
                SlotState::Overdue
            } else {
                SlotState::Pending
            };
            trace!("loan {} slot {} due {}: {}", loan.id, number, due, state);
            Slot {
                number,
                due,
                state,
                due_today: due == today,
            }
        })
        .collect()
}

/// Whether any slot of the loan is overdue as of `today`.
pub fn has_overdue(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> bool {
    classify_slots(loan, receipts, payments, today)
        .iter()
        .any(|slot| slot.state == SlotState::Overdue)
}

/// Lifecycle status earned by receipts and payments alone: `Active` or
/// `Completed`, never `Defaulted`.
pub fn resolve_status(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> LoanStatus {
    if loan.has_manual_settlement(payments) {
        return LoanStatus::Completed;
    }

    let loan_receipts = loan.receipts_in(receipts);
    let received: f64 = loan_receipts.iter().map(|r| r.amount).sum();
    let owed = loan.total_with_interest();
    let covers_total = received + AMOUNT_TOLERANCE >= owed;

    let completed = match loan.payment_type {
        // interest receipts never close the loan
        PaymentType::InterestOnly => loan.is_settled(payments),
        PaymentType::Diario => {
            loan_receipts.len() == loan.installment_count() as usize && covers_total
        }
        PaymentType::Installments | PaymentType::Other => {
            !loan_receipts.is_empty() && covers_total
        }
    };

    if completed {
        LoanStatus::Completed
    } else {
        LoanStatus::Active
    }
}

/// Full lifecycle status as of `today`: completion first, then any overdue
/// slot makes the loan `Defaulted`, otherwise `Active`.
pub fn derive_status(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> LoanStatus {
    match resolve_status(loan, receipts, payments) {
        LoanStatus::Completed => LoanStatus::Completed,
        _ if has_overdue(loan, receipts, payments, today) => LoanStatus::Defaulted,
        _ => LoanStatus::Active,
    }
}

/// Status write demanded by the overdue policy: `Defaulted` when the loan has
/// an overdue slot and is not stored as defaulted already.
pub fn overdue_transition(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> Option<LoanStatus> {
    if loan.status == LoanStatus::Defaulted {
        return None;
    }
    if has_overdue(loan, receipts, payments, today) {
        debug!("loan {} has overdue slots as of {}", loan.id, today);
        Some(LoanStatus::Defaulted)
    } else {
        None
    }
}
