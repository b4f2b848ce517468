use chrono::{Days, Months, NaiveDate};
use log::trace;

use crate::loan::{Loan, Payment, PaymentType, Receipt};
use crate::status;

/// Date of slot `number` (1-based) counted from `anchor`.
///
/// Monthly steps keep the anchor's day of month, clamped to the last day of
/// a shorter target month (Jan 31 + 1 month is Feb 29 in a leap year).
pub fn slot_date(anchor: NaiveDate, payment_type: PaymentType, number: u32) -> Option<NaiveDate> {
    match payment_type {
        PaymentType::Diario => anchor.checked_add_days(Days::new(number.into())),
        PaymentType::Installments | PaymentType::InterestOnly => {
            anchor.checked_add_months(Months::new(number))
        }
        PaymentType::Other => None,
    }
}

/// Number of slots the loan's schedule holds right now.
///
/// Interest-only loans keep one open slot past the receipts recorded so far
/// until a full settlement exists.
pub fn slot_count(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> u32 {
    match loan.payment_type {
        PaymentType::Installments | PaymentType::Diario => loan.installment_count(),
        PaymentType::InterestOnly => {
            let paid = loan.receipts_in(receipts).len() as u32;
            if loan.is_settled(payments) {
                paid
            } else {
                paid + 1
            }
        }
        PaymentType::Other => 0,
    }
}

/// Ordered due dates, one per installment.
///
/// Empty when the loan has no anchor date or no installments.
pub fn generate_schedule(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> Vec<NaiveDate> {
    let Some(anchor) = loan.anchor_date() else {
        trace!("loan {} has no anchor date, nothing scheduled", loan.id);
        return Vec::new();
    };

    let count = slot_count(loan, receipts, payments);
    let schedule: Vec<NaiveDate> = (1..=count)
        .map_while(|number| slot_date(anchor, loan.payment_type, number))
        .collect();
    trace!(
        "loan {} ({}) anchored {}: {} slots",
        loan.id,
        loan.payment_type,
        anchor,
        schedule.len()
    );
    schedule
}

/// First slot without a receipt matched to it by position, or the last slot
/// once every slot has one.
pub fn next_due_date(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> Option<NaiveDate> {
    let schedule = generate_schedule(loan, receipts, payments);
    let paid = loan.receipts_in(receipts).len();
    schedule.get(paid).or(schedule.last()).copied()
}

/// New anchor date for a due date moved to `chosen`.
///
/// The anchor moves back from `chosen` one step per paid slot, so the last
/// paid slot lands on `chosen` and the first unpaid slot one step after it.
/// A loan whose first slot is unpaid (or that has no unpaid slot) is anchored
/// on `chosen` itself.
pub fn rebase_anchor(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    chosen: NaiveDate,
) -> NaiveDate {
    let schedule = generate_schedule(loan, receipts, payments);
    let loan_receipts = loan.receipts_in(receipts);
    let first_unpaid = schedule
        .iter()
        .zip(1u32..)
        .position(|(&due, number)| !status::receipt_covers(loan, number, due, &loan_receipts))
        .unwrap_or(0) as u32;

    if first_unpaid == 0 {
        return chosen;
    }

    let moved = match loan.payment_type {
        PaymentType::Diario => chosen.checked_sub_days(Days::new(first_unpaid.into())),
        _ => chosen.checked_sub_months(Months::new(first_unpaid)),
    };
    moved.unwrap_or(chosen)
}
