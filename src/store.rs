//! Boundary to the data store holding loans, clients, receipts and payments.

use chrono::NaiveDate;

#[cfg(feature = "serde")]
use log::{debug, info};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use std::{fs, path::Path};

use crate::error::{LoanError, Result};
use crate::loan::{Client, Loan, LoanStatus, Payment, PaymentKind, Receipt};

/// Fields of a loan that may be rewritten after origination.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct LoanPatch {
    pub status: Option<LoanStatus>,
    pub due_date: Option<NaiveDate>,
}

impl LoanPatch {
    pub fn status(status: LoanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn apply(&self, loan: &mut Loan) {
        if let Some(status) = self.status {
            loan.status = status;
        }
        if let Some(due_date) = self.due_date {
            loan.due_date = Some(due_date);
        }
    }
}

/// A payment not yet stored; the store assigns its id.
#[derive(Clone, PartialEq, Debug)]
pub struct NewPayment {
    pub loan_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub kind: PaymentKind,
}

/// A receipt not yet stored; the store assigns its id.
#[derive(Clone, PartialEq, Debug)]
pub struct NewReceipt {
    pub loan_id: String,
    pub client_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub receipt_number: String,
    pub payment_id: Option<String>,
}

/// Snapshot reads and mutations offered by the data store.
///
/// No transactional guarantee spans calls: callers read again after writing.
pub trait LoanStore {
    fn loans(&self) -> Result<Vec<Loan>>;
    fn clients(&self) -> Result<Vec<Client>>;
    fn receipts(&self) -> Result<Vec<Receipt>>;
    fn payments(&self) -> Result<Vec<Payment>>;

    fn update_loan(&mut self, id: &str, patch: LoanPatch) -> Result<Loan>;
    fn add_payment(&mut self, payment: NewPayment) -> Result<Payment>;
    fn add_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt>;
    fn delete_receipt(&mut self, id: &str) -> Result<()>;
    /// Removes the loan together with its receipts and payments.
    fn delete_loan_cascade(&mut self, id: &str) -> Result<()>;

    fn loan(&self, id: &str) -> Result<Loan> {
        self.loans()?
            .into_iter()
            .find(|l| l.id == id)
            .ok_or_else(|| LoanError::LoanNotFound(id.to_string()))
    }
}

/// Store kept in memory, persisted as one JSON document.
#[derive(Clone, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct MemoryStore {
    pub clients: Vec<Client>,
    pub loans: Vec<Loan>,
    pub receipts: Vec<Receipt>,
    pub payments: Vec<Payment>,
}

impl MemoryStore {
    pub fn new(
        clients: Vec<Client>,
        loans: Vec<Loan>,
        receipts: Vec<Receipt>,
        payments: Vec<Payment>,
    ) -> Self {
        Self {
            clients,
            loans,
            receipts,
            payments,
        }
    }

    /// Loads a snapshot; a missing file is an empty store.
    #[cfg(feature = "serde")]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no snapshot at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let store: Self = serde_json::from_str(&text)?;
        debug!(
            "loaded {} loans, {} receipts, {} payments from {}",
            store.loans.len(),
            store.receipts.len(),
            store.payments.len(),
            path.display()
        );
        Ok(store)
    }

    #[cfg(feature = "serde")]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("saved snapshot to {}", path.display());
        Ok(())
    }

    fn fresh_id(prefix: &str, taken: impl Fn(&str) -> bool, start: usize) -> String {
        (start + 1..)
            .map(|n| format!("{}-{:06}", prefix, n))
            .find(|id| !taken(id.as_str()))
            .unwrap_or_else(|| prefix.to_string())
    }

    fn has_loan(&self, id: &str) -> bool {
        self.loans.iter().any(|l| l.id == id)
    }
}

impl LoanStore for MemoryStore {
    fn loans(&self) -> Result<Vec<Loan>> {
        Ok(self.loans.clone())
    }

    fn clients(&self) -> Result<Vec<Client>> {
        Ok(self.clients.clone())
    }

    fn receipts(&self) -> Result<Vec<Receipt>> {
        Ok(self.receipts.clone())
    }

    fn payments(&self) -> Result<Vec<Payment>> {
        Ok(self.payments.clone())
    }

    fn update_loan(&mut self, id: &str, patch: LoanPatch) -> Result<Loan> {
        let loan = self
            .loans
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| LoanError::LoanNotFound(id.to_string()))?;
        patch.apply(loan);
        Ok(loan.clone())
    }

    fn add_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        if !self.has_loan(&payment.loan_id) {
            return Err(LoanError::LoanNotFound(payment.loan_id));
        }
        let id = Self::fresh_id(
            "pay",
            |id| self.payments.iter().any(|p| p.id == id),
            self.payments.len(),
        );
        let stored = Payment {
            id,
            loan_id: payment.loan_id,
            amount: payment.amount,
            date: Some(payment.date),
            kind: payment.kind,
            installment_number: None,
        };
        self.payments.push(stored.clone());
        Ok(stored)
    }

    fn add_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt> {
        if !self.has_loan(&receipt.loan_id) {
            return Err(LoanError::LoanNotFound(receipt.loan_id));
        }
        let id = Self::fresh_id(
            "rec",
            |id| self.receipts.iter().any(|r| r.id == id),
            self.receipts.len(),
        );
        let stored = Receipt {
            id,
            loan_id: receipt.loan_id,
            client_id: Some(receipt.client_id),
            amount: receipt.amount,
            date: Some(receipt.date),
            receipt_number: receipt.receipt_number,
            payment_id: receipt.payment_id,
        };
        self.receipts.push(stored.clone());
        Ok(stored)
    }

    fn delete_receipt(&mut self, id: &str) -> Result<()> {
        let before = self.receipts.len();
        self.receipts.retain(|r| r.id != id);
        if self.receipts.len() == before {
            return Err(LoanError::ReceiptNotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_loan_cascade(&mut self, id: &str) -> Result<()> {
        if !self.has_loan(id) {
            return Err(LoanError::LoanNotFound(id.to_string()));
        }
        self.loans.retain(|l| l.id != id);
        self.receipts.retain(|r| r.loan_id != id);
        self.payments.retain(|p| p.loan_id != id);
        Ok(())
    }
}
