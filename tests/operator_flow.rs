#![cfg(feature = "serde")]

use chrono::NaiveDate;
use loanbook::{
    actions,
    balance::outstanding_balance,
    calendar::{due_day, DayMarker},
    error::{LoanError, Result},
    loan::{Client, Loan, LoanStatus, Payment, PaymentKind, PaymentType, Receipt},
    store::{LoanPatch, LoanStore, MemoryStore, NewPayment, NewReceipt},
    summary::{list_loans, StatusFilter},
};
use test_log::test;

const SNAPSHOT: &str = r#"{
  "clients": [
    { "id": "c1", "name": "Maria Souza", "phone": "67992825341" },
    { "id": "c2", "name": "João Lima" }
  ],
  "loans": [
    {
      "id": "ln-0001", "clientId": "c1", "amount": 300, "totalAmount": 330,
      "interestRate": "10%", "paymentType": "installments", "installments": 3,
      "installmentAmount": 110, "startDate": "2024-01-31T12:00:00.000Z", "status": "active"
    },
    {
      "id": "ln-0002", "clientId": "c2", "amount": 1000, "interestRate": 10,
      "paymentType": "interest_only", "startDate": "2024-01-15"
    },
    {
      "id": "ln-0003", "clientId": "c1", "amount": 40, "interestRate": "25,0 % a.m.",
      "paymentType": "diario", "numberOfInstallments": 5, "installmentAmount": 10,
      "createdAt": "2024-03-01 09:30:00", "status": "active",
      "payments": [ { "id": "emb-1", "loanId": "ln-0003", "amount": 5, "type": "interest_only" } ]
    },
    {
      "id": "ln-0004", "clientId": "c2", "amount": 50, "interestRate": null,
      "paymentType": "weekly", "startDate": "2024-01-01"
    }
  ],
  "receipts": [],
  "payments": []
}"#;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn book() -> MemoryStore {
    serde_json::from_str(SNAPSHOT).unwrap()
}

fn status_of(store: &impl LoanStore, id: &str) -> LoanStatus {
    store.loan(id).unwrap().status
}

/// Store that rejects status updates for one loan.
struct FlakyStore {
    inner: MemoryStore,
    reject: &'static str,
}

impl LoanStore for FlakyStore {
    fn loans(&self) -> Result<Vec<Loan>> {
        self.inner.loans()
    }
    fn clients(&self) -> Result<Vec<Client>> {
        self.inner.clients()
    }
    fn receipts(&self) -> Result<Vec<Receipt>> {
        self.inner.receipts()
    }
    fn payments(&self) -> Result<Vec<Payment>> {
        self.inner.payments()
    }
    fn update_loan(&mut self, id: &str, patch: LoanPatch) -> Result<Loan> {
        if id == self.reject {
            return Err(LoanError::Store {
                operation: "update_loan",
                reason: "connection reset".to_string(),
            });
        }
        self.inner.update_loan(id, patch)
    }
    fn add_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        self.inner.add_payment(payment)
    }
    fn add_receipt(&mut self, receipt: NewReceipt) -> Result<Receipt> {
        self.inner.add_receipt(receipt)
    }
    fn delete_receipt(&mut self, id: &str) -> Result<()> {
        self.inner.delete_receipt(id)
    }
    fn delete_loan_cascade(&mut self, id: &str) -> Result<()> {
        self.inner.delete_loan_cascade(id)
    }
}

#[test]
fn snapshot_reads_source_records() {
    let store = book();
    assert_eq!(store.loans.len(), 4);

    let monthly = &store.loans[0];
    assert_eq!(monthly.start_date, Some(ymd(2024, 1, 31)));
    assert_eq!(monthly.interest_rate.percent(), 10.);

    let daily = &store.loans[2];
    assert_eq!(daily.installment_count(), 5);
    assert_eq!(daily.anchor_date(), Some(ymd(2024, 3, 1)));
    assert_eq!(daily.interest_rate.percent(), 25.);
    assert_eq!(daily.payments.len(), 1);

    assert_eq!(store.loans[3].payment_type, PaymentType::Other);
    assert_eq!(store.loans[3].interest_rate.percent(), 0.);
    assert_eq!(store.clients[1].phone, None);
}

#[test]
fn sweep_continues_past_rejected_updates() {
    let mut store = FlakyStore {
        inner: book(),
        reject: "ln-0002",
    };
    let report = actions::sweep_overdue(&mut store, ymd(2024, 3, 5)).unwrap();

    assert_eq!(report.defaulted, vec!["ln-0001", "ln-0003"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "ln-0002");
    assert!(matches!(report.failures[0].1, LoanError::Store { .. }));

    assert_eq!(status_of(&store, "ln-0002"), LoanStatus::Active);
    // nothing scheduled, nothing overdue
    assert_eq!(status_of(&store, "ln-0004"), LoanStatus::Active);
}

#[test]
fn operator_day() {
    let mut store = book();
    let today = ymd(2024, 3, 5);

    let report = actions::sweep_overdue(&mut store, today).unwrap();
    assert_eq!(report.defaulted, vec!["ln-0001", "ln-0002", "ln-0003"]);

    // monthly loan paid off in three receipts
    actions::record_receipt(&mut store, "ln-0001", 110., today, today).unwrap();
    assert_eq!(status_of(&store, "ln-0001"), LoanStatus::Active);
    actions::record_receipt(&mut store, "ln-0001", 110., today, today).unwrap();
    let last = actions::record_receipt(&mut store, "ln-0001", 110., today, today).unwrap();
    assert_eq!(last.receipt_number, "REC-00030001");
    assert_eq!(status_of(&store, "ln-0001"), LoanStatus::Completed);

    // interest month paid on its day, then the principal
    actions::record_receipt(&mut store, "ln-0002", 100., ymd(2024, 2, 15), today).unwrap();
    assert_eq!(status_of(&store, "ln-0002"), LoanStatus::Active);
    actions::record_payment(&mut store, "ln-0002", 1000., PaymentKind::Full, today, today)
        .unwrap();
    assert_eq!(status_of(&store, "ln-0002"), LoanStatus::Completed);

    // daily loan settled by hand: the embedded interest payment already counts
    let settlement = actions::settle(&mut store, "ln-0003", today, today).unwrap();
    assert_eq!(settlement.amount, 45.);
    assert_eq!(status_of(&store, "ln-0003"), LoanStatus::Completed);

    let receipts = store.receipts().unwrap();
    let payments = store.payments().unwrap();
    for loan in store.loans().unwrap().iter().take(3) {
        assert_eq!(outstanding_balance(loan, &receipts, &payments), 0., "{}", loan.id);
    }

    let completed = list_loans(
        &store.loans,
        &store.clients,
        &receipts,
        &payments,
        today,
        StatusFilter::Completed,
        "",
    );
    assert_eq!(completed.len(), 3);
    assert!(completed.iter().all(|s| s.warnings.is_empty()));

    let day = due_day(
        ymd(2024, 3, 31),
        &store.loans,
        &store.clients,
        &receipts,
        &payments,
        today,
    );
    assert_eq!(day.entries.len(), 1);
    assert_eq!(day.marker(), Some(DayMarker::Paid));
    assert_eq!(day.entries[0].client_name, "Maria Souza");

    // snapshot survives a save and reload
    let dir = std::env::temp_dir().join(format!("loanbook-flow-{}", std::process::id()));
    let path = dir.join("book.json");
    store.save(&path).unwrap();
    let reloaded = MemoryStore::open(&path).unwrap();
    assert_eq!(reloaded, store);
    std::fs::remove_dir_all(&dir).unwrap();

    actions::delete_loan(&mut store, "ln-0001").unwrap();
    assert_eq!(store.loans.len(), 3);
    assert!(store.receipts.iter().all(|r| r.loan_id != "ln-0001"));
    assert!(matches!(
        actions::delete_loan(&mut store, "ln-0001"),
        Err(LoanError::LoanNotFound(_))
    ));
}

#[test]
fn due_date_change_reopens_a_defaulted_loan() {
    let mut store = book();
    let today = ymd(2024, 3, 5);
    actions::sweep_overdue(&mut store, today).unwrap();
    assert_eq!(status_of(&store, "ln-0001"), LoanStatus::Defaulted);

    let anchor = actions::change_due_date(&mut store, "ln-0001", ymd(2024, 3, 20), today).unwrap();
    assert_eq!(anchor, ymd(2024, 3, 20));
    assert_eq!(status_of(&store, "ln-0001"), LoanStatus::Active);

    let report = actions::sweep_overdue(&mut store, today).unwrap();
    assert!(!report.defaulted.contains(&"ln-0001".to_string()));
}
