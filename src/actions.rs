//! Operator actions: each one writes through a [`LoanStore`] and then brings
//! the stored loan status back in line with the derived one.

use chrono::NaiveDate;
use log::{error, info, warn};
use std::fmt;

use crate::balance::outstanding_balance;
use crate::error::{LoanError, Result};
use crate::loan::{LoanStatus, Payment, PaymentKind, Receipt};
use crate::schedule::rebase_anchor;
use crate::status::{derive_status, overdue_transition};
use crate::store::{LoanPatch, LoanStore, NewPayment, NewReceipt};
use crate::summary::consistency_warning;

fn check_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() {
        return Err(LoanError::InvalidAmount {
            amount,
            reason: "not a number",
        });
    }
    if amount <= 0. {
        return Err(LoanError::InvalidAmount {
            amount,
            reason: "must be greater than zero",
        });
    }
    Ok(())
}

/// `REC-` followed by a 4-digit sequence and the last four characters of the
/// loan id.
pub fn receipt_number(sequence: usize, loan_id: &str) -> String {
    let chars: Vec<char> = loan_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("REC-{:04}{}", sequence % 10_000, tail)
}

/// Sequence for the next receipt: one past the highest sequence issued so
/// far, never below one past the receipt count.
pub fn next_receipt_sequence(receipts: &[Receipt]) -> usize {
    let highest = receipts
        .iter()
        .filter_map(|r| r.receipt_number.strip_prefix("REC-")?.get(..4)?.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    highest.max(receipts.len()) + 1
}

/// Writes the derived status of the loan when it differs from the stored one
/// and returns the status the loan ends up with.
///
/// A loan stored as completed is never reopened; a remaining balance only
/// raises a warning.
pub fn sync_status<S: LoanStore>(store: &mut S, loan_id: &str, today: NaiveDate) -> Result<LoanStatus> {
    let loan = store.loan(loan_id)?;
    let receipts = store.receipts()?;
    let payments = store.payments()?;
    let derived = derive_status(&loan, &receipts, &payments, today);

    if loan.status == LoanStatus::Completed && derived != LoanStatus::Completed {
        consistency_warning(&loan, outstanding_balance(&loan, &receipts, &payments));
        return Ok(loan.status);
    }
    if derived == loan.status {
        return Ok(derived);
    }

    match store.update_loan(loan_id, LoanPatch::status(derived)) {
        Ok(updated) => {
            info!("loan {}: {} -> {}", loan_id, loan.status, updated.status);
            Ok(updated.status)
        }
        Err(e) => {
            error!("could not update status of loan {}: {}", loan_id, e);
            Err(e)
        }
    }
}

/// Records one installment receipt for the loan.
pub fn record_receipt<S: LoanStore>(
    store: &mut S,
    loan_id: &str,
    amount: f64,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<Receipt> {
    check_amount(amount)?;
    let loan = store.loan(loan_id)?;
    let sequence = next_receipt_sequence(&store.receipts()?);

    let receipt = store
        .add_receipt(NewReceipt {
            loan_id: loan.id.clone(),
            client_id: loan.client_id.clone(),
            amount,
            date,
            receipt_number: receipt_number(sequence, &loan.id),
            payment_id: None,
        })
        .map_err(|e| {
            error!("could not record receipt for loan {}: {}", loan_id, e);
            e
        })?;
    info!("{}", receipt);

    sync_status(store, loan_id, today)?;
    Ok(receipt)
}

/// Records a lump-sum payment of kind `Full` or `InterestOnly`.
///
/// Settlements go through [`settle`], which fixes their amount.
pub fn record_payment<S: LoanStore>(
    store: &mut S,
    loan_id: &str,
    amount: f64,
    kind: PaymentKind,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<Payment> {
    check_amount(amount)?;
    if kind == PaymentKind::ManualSettlement {
        return Err(LoanError::InvalidAmount {
            amount,
            reason: "settlement amounts are taken from the outstanding balance",
        });
    }
    store.loan(loan_id)?;

    let payment = store
        .add_payment(NewPayment {
            loan_id: loan_id.to_string(),
            amount,
            date,
            kind,
        })
        .map_err(|e| {
            error!("could not record payment for loan {}: {}", loan_id, e);
            e
        })?;
    info!("{}", payment);

    sync_status(store, loan_id, today)?;
    Ok(payment)
}

/// Settles the loan manually for whatever is still outstanding, completing it
/// whatever its modality. A loan owing nothing is rejected.
pub fn settle<S: LoanStore>(
    store: &mut S,
    loan_id: &str,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<Payment> {
    let loan = store.loan(loan_id)?;
    let outstanding = outstanding_balance(&loan, &store.receipts()?, &store.payments()?);
    if outstanding <= 0. {
        return Err(LoanError::InvalidAmount {
            amount: outstanding,
            reason: "nothing outstanding to settle",
        });
    }

    let payment = store
        .add_payment(NewPayment {
            loan_id: loan_id.to_string(),
            amount: outstanding,
            date,
            kind: PaymentKind::ManualSettlement,
        })
        .map_err(|e| {
            error!("could not settle loan {}: {}", loan_id, e);
            e
        })?;
    info!("loan {} settled for ${:.2}", loan_id, outstanding);

    sync_status(store, loan_id, today)?;
    Ok(payment)
}

/// Moves the loan's due date to `chosen` and re-syncs its status.
///
/// The anchor is rebased with [`rebase_anchor`]: the last paid slot lands on
/// `chosen` and the first unpaid slot one period after it.
pub fn change_due_date<S: LoanStore>(
    store: &mut S,
    loan_id: &str,
    chosen: NaiveDate,
    today: NaiveDate,
) -> Result<NaiveDate> {
    let loan = store.loan(loan_id)?;
    let anchor = rebase_anchor(&loan, &store.receipts()?, &store.payments()?, chosen);

    let patch = LoanPatch {
        due_date: Some(anchor),
        ..LoanPatch::default()
    };
    store.update_loan(loan_id, patch).map_err(|e| {
        error!("could not change due date of loan {}: {}", loan_id, e);
        e
    })?;
    let status = sync_status(store, loan_id, today)?;
    info!(
        "loan {}: due date {}, anchored {}, now {}",
        loan_id, chosen, anchor, status
    );
    Ok(anchor)
}

/// Deletes a receipt and re-syncs the status of the loan it belonged to.
pub fn delete_receipt<S: LoanStore>(
    store: &mut S,
    receipt_id: &str,
    today: NaiveDate,
) -> Result<LoanStatus> {
    let receipt = store
        .receipts()?
        .into_iter()
        .find(|r| r.id == receipt_id)
        .ok_or_else(|| LoanError::ReceiptNotFound(receipt_id.to_string()))?;

    store.delete_receipt(receipt_id).map_err(|e| {
        error!("could not delete receipt {}: {}", receipt_id, e);
        e
    })?;
    info!("deleted receipt {} of loan {}", receipt_id, receipt.loan_id);

    sync_status(store, &receipt.loan_id, today)
}

/// Deletes a loan with all of its receipts and payments.
pub fn delete_loan<S: LoanStore>(store: &mut S, loan_id: &str) -> Result<()> {
    store.delete_loan_cascade(loan_id).map_err(|e| {
        error!("could not delete loan {}: {}", loan_id, e);
        e
    })?;
    info!("deleted loan {} with its receipts and payments", loan_id);
    Ok(())
}

/// Outcome of an overdue sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Loans moved to defaulted.
    pub defaulted: Vec<String>,
    /// Loans whose update the store rejected; left for a later sweep.
    pub failures: Vec<(String, LoanError)>,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loan(s) marked defaulted, {} failure(s)",
            self.defaulted.len(),
            self.failures.len()
        )
    }
}

/// Marks every loan with an overdue slot as defaulted.
///
/// A rejected update is logged and collected; the sweep carries on with the
/// remaining loans.
pub fn sweep_overdue<S: LoanStore>(store: &mut S, today: NaiveDate) -> Result<SweepReport> {
    let loans = store.loans()?;
    let receipts = store.receipts()?;
    let payments = store.payments()?;
    let mut report = SweepReport::default();

    for loan in &loans {
        let Some(status) = overdue_transition(loan, &receipts, &payments, today) else {
            continue;
        };
        match store.update_loan(&loan.id, LoanPatch::status(status)) {
            Ok(_) => {
                info!("loan {}: {} -> {}", loan.id, loan.status, status);
                report.defaulted.push(loan.id.clone());
            }
            Err(e) => {
                warn!("could not mark loan {} {}: {}", loan.id, status, e);
                report.failures.push((loan.id.clone(), e));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        change_due_date, check_amount, delete_receipt, next_receipt_sequence, receipt_number,
        record_payment, record_receipt, settle, sweep_overdue, sync_status,
    };
    use crate::error::LoanError;
    use crate::loan::{Loan, LoanStatus, PaymentKind, PaymentType};
    use crate::schedule::generate_schedule;
    use crate::status::has_overdue;
    use crate::store::{LoanStore, MemoryStore};
    use chrono::NaiveDate;
    use test_log::test;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn installment_loan() -> Loan {
        Loan {
            installments: Some(3),
            installment_amount: Some(100.),
            start_date: Some(ymd(2024, 1, 10)),
            ..Loan::new("loan-0042", "c1", 250., 10., PaymentType::Installments)
        }
    }

    fn interest_only_loan() -> Loan {
        Loan {
            start_date: Some(ymd(2024, 1, 15)),
            ..Loan::new("io", "c2", 1000., 10., PaymentType::InterestOnly)
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(
            Vec::new(),
            vec![installment_loan(), interest_only_loan()],
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn test_receipt_number() {
        assert_eq!(receipt_number(1, "loan-0042"), "REC-00010042");
        assert_eq!(receipt_number(12345, "ab"), "REC-2345ab");
        assert_eq!(receipt_number(7, "empréstimo"), "REC-0007timo");
    }

    #[test]
    fn test_receipt_numbers_survive_deletion() {
        let mut store = store();
        let today = ymd(2024, 2, 1);
        let first = record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();
        let second = record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();
        delete_receipt(&mut store, &first.id, today).unwrap();

        let third = record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();
        assert_ne!(third.receipt_number, second.receipt_number);
        assert_eq!(third.receipt_number, "REC-00030042");
    }

    #[test]
    fn test_next_receipt_sequence() {
        let mut store = store();
        assert_eq!(next_receipt_sequence(&store.receipts), 1);

        let today = ymd(2024, 2, 1);
        record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();
        store.receipts[0].receipt_number = "REC-0041loan".to_string();
        assert_eq!(next_receipt_sequence(&store.receipts), 42);

        // numbers from elsewhere fall back to the receipt count
        store.receipts[0].receipt_number = "R-17".to_string();
        assert_eq!(next_receipt_sequence(&store.receipts), 2);
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount(0.01).is_ok());
        assert!(matches!(check_amount(0.), Err(LoanError::InvalidAmount { .. })));
        assert!(matches!(check_amount(-5.), Err(LoanError::InvalidAmount { .. })));
        assert!(matches!(check_amount(f64::NAN), Err(LoanError::InvalidAmount { .. })));
    }

    #[test]
    fn test_record_receipts_complete_the_loan() {
        let mut store = store();
        let today = ymd(2024, 2, 1);

        let first = record_receipt(&mut store, "loan-0042", 100., ymd(2024, 2, 1), today).unwrap();
        assert_eq!(first.receipt_number, "REC-00010042");
        assert_eq!(first.client_id.as_deref(), Some("c1"));
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Active);

        record_receipt(&mut store, "loan-0042", 100., ymd(2024, 2, 1), today).unwrap();
        record_receipt(&mut store, "loan-0042", 100., ymd(2024, 2, 1), today).unwrap();
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Completed);

        assert!(matches!(
            record_receipt(&mut store, "missing", 10., today, today),
            Err(LoanError::LoanNotFound(_))
        ));
        assert!(matches!(
            record_receipt(&mut store, "loan-0042", 0., today, today),
            Err(LoanError::InvalidAmount { .. })
        ));
        assert_eq!(store.receipts.len(), 3);
    }

    #[test]
    fn test_record_payment() {
        let mut store = store();
        let today = ymd(2024, 2, 1);

        let interest =
            record_payment(&mut store, "io", 100., PaymentKind::InterestOnly, today, today).unwrap();
        assert_eq!(interest.kind, PaymentKind::InterestOnly);
        assert_eq!(store.loan("io").unwrap().status, LoanStatus::Active);

        record_payment(&mut store, "io", 1000., PaymentKind::Full, today, today).unwrap();
        assert_eq!(store.loan("io").unwrap().status, LoanStatus::Completed);
        // no receipt is created alongside a payment
        assert!(store.receipts.is_empty());

        assert!(matches!(
            record_payment(&mut store, "io", -1., PaymentKind::Full, today, today),
            Err(LoanError::InvalidAmount { .. })
        ));
        assert!(matches!(
            record_payment(&mut store, "io", 5., PaymentKind::ManualSettlement, today, today),
            Err(LoanError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_settle_pays_the_outstanding_balance() {
        let mut store = store();
        let today = ymd(2024, 2, 1);
        record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();

        let payment = settle(&mut store, "loan-0042", today, today).unwrap();
        assert_eq!(payment.kind, PaymentKind::ManualSettlement);
        assert_eq!(payment.amount, 200.);
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Completed);

        // nothing left to settle
        assert!(matches!(
            settle(&mut store, "loan-0042", today, today),
            Err(LoanError::InvalidAmount { .. })
        ));
        assert_eq!(store.payments.len(), 1);

        let payment = settle(&mut store, "io", today, today).unwrap();
        assert_eq!(payment.amount, 1000.);
        assert_eq!(store.loan("io").unwrap().status, LoanStatus::Completed);
    }

    #[test]
    fn test_sync_status_transitions() {
        let mut store = store();
        assert_eq!(
            sync_status(&mut store, "loan-0042", ymd(2024, 2, 11)).unwrap(),
            LoanStatus::Defaulted
        );
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Defaulted);

        // back to active once the overdue slot is paid
        record_receipt(&mut store, "loan-0042", 100., ymd(2024, 2, 12), ymd(2024, 2, 12)).unwrap();
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Active);
    }

    #[test]
    fn test_sync_status_keeps_stored_completion() {
        let mut store = store();
        store.loans[0].status = LoanStatus::Completed;
        assert_eq!(
            sync_status(&mut store, "loan-0042", ymd(2025, 1, 1)).unwrap(),
            LoanStatus::Completed
        );
        assert_eq!(store.loans[0].status, LoanStatus::Completed);
    }

    #[test]
    fn test_change_due_date() {
        let mut store = store();
        let today = ymd(2024, 6, 1);
        record_receipt(&mut store, "loan-0042", 100., ymd(2024, 2, 10), today).unwrap();

        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Defaulted);

        // one paid slot: anchor lands one month before the chosen date
        let anchor = change_due_date(&mut store, "loan-0042", ymd(2024, 7, 20), today).unwrap();
        assert_eq!(anchor, ymd(2024, 6, 20));
        let loan = store.loan("loan-0042").unwrap();
        assert_eq!(loan.due_date, Some(ymd(2024, 6, 20)));
        assert_eq!(loan.status, LoanStatus::Active);

        // anchor before today, but the chosen date is the paid slot: still active
        let anchor = change_due_date(&mut store, "loan-0042", ymd(2024, 6, 15), today).unwrap();
        assert_eq!(anchor, ymd(2024, 5, 15));
        let loan = store.loan("loan-0042").unwrap();
        assert_eq!(
            generate_schedule(&loan, &store.receipts, &store.payments),
            vec![ymd(2024, 6, 15), ymd(2024, 7, 15), ymd(2024, 8, 15)]
        );
        assert!(!has_overdue(&loan, &store.receipts, &store.payments, today));
        assert_eq!(loan.status, LoanStatus::Active);

        // first unpaid slot on May 20 is overdue
        change_due_date(&mut store, "loan-0042", ymd(2024, 4, 20), today).unwrap();
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Defaulted);
    }

    #[test]
    fn test_change_due_date_keeps_completion() {
        let mut store = store();
        let today = ymd(2024, 6, 1);
        for _ in 0..3 {
            record_receipt(&mut store, "loan-0042", 100., today, today).unwrap();
        }
        change_due_date(&mut store, "loan-0042", ymd(2024, 1, 1), today).unwrap();
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Completed);
    }

    #[test]
    fn test_delete_receipt_resyncs() {
        let mut store = store();
        let today = ymd(2024, 2, 1);
        let mut last = None;
        for _ in 0..3 {
            last = Some(record_receipt(&mut store, "loan-0042", 100., today, today).unwrap());
        }
        assert_eq!(store.loan("loan-0042").unwrap().status, LoanStatus::Completed);

        let last = last.unwrap();
        // completion is never reopened automatically
        assert_eq!(
            delete_receipt(&mut store, &last.id, today).unwrap(),
            LoanStatus::Completed
        );
        assert_eq!(store.receipts.len(), 2);

        assert!(matches!(
            delete_receipt(&mut store, &last.id, today),
            Err(LoanError::ReceiptNotFound(_))
        ));
    }

    #[test]
    fn test_sweep_overdue() {
        let mut store = store();
        let report = sweep_overdue(&mut store, ymd(2024, 1, 20)).unwrap();
        assert!(report.defaulted.is_empty());

        let report = sweep_overdue(&mut store, ymd(2024, 2, 16)).unwrap();
        assert_eq!(report.defaulted, vec!["loan-0042", "io"]);
        assert!(report.failures.is_empty());
        assert_eq!(report.to_string(), "2 loan(s) marked defaulted, 0 failure(s)");

        // already defaulted loans are left alone
        let report = sweep_overdue(&mut store, ymd(2024, 2, 16)).unwrap();
        assert!(report.defaulted.is_empty());
    }
}
