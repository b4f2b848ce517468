//! Per-day view of everything due across the book of loans.

use chrono::{Datelike, NaiveDate};
use std::{collections::BTreeMap, fmt};

use crate::balance::amount_per_slot;
use crate::loan::{Client, Loan, LoanStatus, Payment, PaymentType, Receipt};
use crate::status::{classify_slots, Slot, SlotState};

/// Name shown for a loan's client, falling back to the client id.
pub fn client_name(clients: &[Client], client_id: &str) -> String {
    clients
        .iter()
        .find(|c| c.id == client_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| client_id.to_string())
}

/// Slots of the loan as the calendar shows them: a loan stored as completed
/// has every slot paid.
fn calendar_slots(
    loan: &Loan,
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> Vec<Slot> {
    let mut slots = classify_slots(loan, receipts, payments, today);
    if loan.status == LoanStatus::Completed {
        for slot in &mut slots {
            slot.state = SlotState::Paid;
        }
    }
    slots
}

#[derive(Clone, PartialEq, Debug)]
pub struct DueEntry {
    pub loan_id: String,
    pub client_name: String,
    pub payment_type: PaymentType,
    /// 1-based slot number.
    pub number: u32,
    /// Installment count for fixed modalities.
    pub of: Option<u32>,
    pub amount: f64,
    pub state: SlotState,
    pub due_today: bool,
}

impl fmt::Display for DueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - ", self.client_name)?;
        match (self.payment_type, self.of) {
            (PaymentType::Installments, Some(of)) => {
                write!(f, "installment {}/{}: ${:.2}", self.number, of, self.amount)?
            }
            (PaymentType::Diario, _) => write!(f, "daily amount: ${:.2}", self.amount)?,
            (PaymentType::InterestOnly, _) => write!(f, "interest: ${:.2}", self.amount)?,
            _ => write!(f, "amount: ${:.2}", self.amount)?,
        }
        if self.due_today {
            write!(f, " (today)")?;
        }
        match self.state {
            SlotState::Paid => write!(f, " (paid)"),
            SlotState::Overdue => write!(f, " (overdue)"),
            SlotState::Pending => Ok(()),
        }
    }
}

/// How a calendar day is highlighted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DayMarker {
    Paid,
    Overdue,
    Scheduled,
}

impl DayMarker {
    fn from_states(states: impl IntoIterator<Item = SlotState>) -> Option<Self> {
        let mut marker = None;
        for state in states {
            match state {
                SlotState::Paid => return Some(DayMarker::Paid),
                SlotState::Overdue => marker = Some(DayMarker::Overdue),
                SlotState::Pending => {
                    marker.get_or_insert(DayMarker::Scheduled);
                }
            }
        }
        marker
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct DueDay {
    pub date: NaiveDate,
    pub entries: Vec<DueEntry>,
}

impl DueDay {
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.amount).sum()
    }

    /// `None` when nothing falls due on the day.
    pub fn marker(&self) -> Option<DayMarker> {
        DayMarker::from_states(self.entries.iter().map(|e| e.state))
    }
}

/// Every slot of every loan falling due on `date`, classified as of `today`.
pub fn due_day(
    date: NaiveDate,
    loans: &[Loan],
    clients: &[Client],
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> DueDay {
    let entries = loans
        .iter()
        .flat_map(|loan| {
            calendar_slots(loan, receipts, payments, today)
                .into_iter()
                .filter(move |slot| slot.due == date)
                .map(move |slot| DueEntry {
                    loan_id: loan.id.clone(),
                    client_name: client_name(clients, &loan.client_id),
                    payment_type: loan.payment_type,
                    number: slot.number,
                    of: loan
                        .payment_type
                        .is_positional()
                        .then(|| loan.installment_count()),
                    amount: amount_per_slot(loan),
                    state: slot.state,
                    due_today: slot.due_today,
                })
        })
        .collect();
    DueDay { date, entries }
}

/// Marker for each day of the month that has something due.
pub fn month_markers(
    year: i32,
    month: u32,
    loans: &[Loan],
    receipts: &[Receipt],
    payments: &[Payment],
    today: NaiveDate,
) -> BTreeMap<NaiveDate, DayMarker> {
    let mut states: BTreeMap<NaiveDate, Vec<SlotState>> = BTreeMap::new();
    for loan in loans {
        for slot in calendar_slots(loan, receipts, payments, today) {
            if slot.due.year() == year && slot.due.month() == month {
                states.entry(slot.due).or_default().push(slot.state);
            }
        }
    }
    states
        .into_iter()
        .filter_map(|(date, day)| DayMarker::from_states(day).map(|marker| (date, marker)))
        .collect()
}
