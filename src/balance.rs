use chrono::NaiveDate;
use log::trace;

use crate::loan::{Loan, Payment, PaymentType, Receipt};
use crate::schedule::generate_schedule;

/// Everything received for the loan: receipts plus lump-sum payments.
pub fn total_received(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> f64 {
    let from_receipts: f64 = loan.receipts_in(receipts).iter().map(|r| r.amount).sum();
    let from_payments: f64 = loan.payments_in(payments).iter().map(|p| p.amount).sum();
    from_receipts + from_payments
}

/// Amount still owed on the loan. Never negative.
///
/// Interest-only loans owe their whole total until a full settlement, since
/// interest payments do not reduce principal.
pub fn outstanding_balance(loan: &Loan, receipts: &[Receipt], payments: &[Payment]) -> f64 {
    let owed = loan.total_with_interest();
    match loan.payment_type {
        PaymentType::InterestOnly => {
            if loan.is_settled(payments) {
                0.
            } else {
                owed.max(0.)
            }
        }
        _ => (owed - total_received(loan, receipts, payments)).max(0.),
    }
}

/// Amount expected on each of the loan's slots.
pub fn amount_per_slot(loan: &Loan) -> f64 {
    match loan.payment_type {
        PaymentType::InterestOnly => loan.period_interest(),
        _ => loan.installment_value().unwrap_or(loan.amount),
    }
}

/// Total expected across all loans on `date`.
pub fn amount_due_on(
    date: NaiveDate,
    loans: &[Loan],
    receipts: &[Receipt],
    payments: &[Payment],
) -> f64 {
    loans
        .iter()
        .map(|loan| {
            let slots = generate_schedule(loan, receipts, payments)
                .into_iter()
                .filter(|&due| due == date)
                .count();
            if slots > 0 {
                trace!("loan {} has {} slot(s) due {}", loan.id, slots, date);
            }
            slots as f64 * amount_per_slot(loan)
        })
        .sum()
}
