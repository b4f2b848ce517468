use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::{fmt, sync::OnceLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{LoanError, Result};

/// Repayment modality of a loan.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PaymentType {
    /// Monthly installments.
    Installments,
    /// Daily installments.
    Diario,
    /// Recurring monthly interest, principal settled with a `full` payment.
    InterestOnly,
    #[cfg_attr(feature = "serde", serde(other))]
    Other,
}

impl PaymentType {
    /// Installments and diario loans pair receipts with slots by position.
    pub fn is_positional(self) -> bool {
        matches!(self, PaymentType::Installments | PaymentType::Diario)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentType::Installments => "installments",
            PaymentType::Diario => "diario",
            PaymentType::InterestOnly => "interest_only",
            PaymentType::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum LoanStatus {
    #[default]
    Active,
    Completed,
    Defaulted,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Defaulted => "defaulted",
        };
        f.write_str(name)
    }
}

/// Kind of a lump-sum payment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum PaymentKind {
    Full,
    InterestOnly,
    /// Operator-declared settlement of whatever was still outstanding.
    ManualSettlement,
}

impl PaymentKind {
    /// Whether a payment of this kind closes an interest-only loan.
    pub fn settles_loan(self) -> bool {
        matches!(self, PaymentKind::Full | PaymentKind::ManualSettlement)
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentKind::Full => "full",
            PaymentKind::InterestOnly => "interest_only",
            PaymentKind::ManualSettlement => "manual_settlement",
        };
        f.write_str(name)
    }
}

/// Monthly interest rate in percent (`10.0` is 10% a month).
///
/// Stored records carry the rate either as a number or as free text such as
/// `"10%"` or `"2,5 % a.m."`; text is read leniently and anything that has no
/// numeric part is taken as 0%.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(transparent))]
pub struct InterestRate(pub f64);

impl InterestRate {
    pub fn parse_lenient(text: &str) -> Self {
        static NUMERIC: OnceLock<Regex> = OnceLock::new();
        let re = NUMERIC.get_or_init(|| Regex::new(r"[\d,.]+").expect("numeric run pattern"));

        let Some(found) = re.find(text) else {
            return InterestRate(0.);
        };

        // keep the longest prefix that still reads as a decimal number
        let mut seen_point = false;
        let normalized: String = found
            .as_str()
            .chars()
            .map(|c| if c == ',' { '.' } else { c })
            .take_while(|&c| {
                if c == '.' {
                    if seen_point {
                        return false;
                    }
                    seen_point = true;
                }
                true
            })
            .collect();

        match normalized.parse::<f64>() {
            Ok(rate) if rate.is_finite() => InterestRate(rate),
            _ => InterestRate(0.),
        }
    }

    pub fn percent(self) -> f64 {
        self.0
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for InterestRate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
            Missing(()),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(rate) => InterestRate(rate),
            Raw::Text(text) => InterestRate::parse_lenient(&text),
            Raw::Missing(()) => InterestRate(0.),
        })
    }
}

/// Reads a stored date, keeping only the calendar day.
///
/// Accepts plain `YYYY-MM-DD`, RFC 3339 timestamps and naive timestamps.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(stamp.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(stamp.date());
        }
    }
    Err(LoanError::InvalidDate(text.to_string()))
}

#[cfg(feature = "serde")]
mod lenient_date {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn option<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) if !text.trim().is_empty() => super::parse_date(&text)
                .map(Some)
                .map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub phone: Option<String>,
}

/// A lump-sum event against a loan, distinct from installment receipts.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Payment {
    pub id: String,
    pub loan_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub amount: f64,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "lenient_date::option")
    )]
    pub date: Option<NaiveDate>,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: PaymentKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub installment_number: Option<u32>,
}

impl fmt::Display for Payment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payment {} ({}), loan {}, amount ${:.2}",
            self.id, self.kind, self.loan_id, self.amount
        )?;
        if let Some(date) = self.date {
            write!(f, ", date {}", date)?;
        }
        Ok(())
    }
}

/// Confirmation of one scheduled installment or periodic interest payment.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Receipt {
    pub id: String,
    pub loan_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub client_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub amount: f64,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "lenient_date::option")
    )]
    pub date: Option<NaiveDate>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub receipt_number: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub payment_id: Option<String>,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "receipt {}, loan {}, amount ${:.2}",
            self.receipt_number, self.loan_id, self.amount
        )?;
        if let Some(date) = self.date {
            write!(f, ", date {}", date)?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct Loan {
    pub id: String,
    pub client_id: String,
    /// Principal.
    pub amount: f64,
    /// Principal plus interest, as computed at origination.
    #[cfg_attr(feature = "serde", serde(default))]
    pub total_amount: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub interest_rate: InterestRate,
    pub payment_type: PaymentType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub installments: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub number_of_installments: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub installment_amount: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "lenient_date::option")
    )]
    pub start_date: Option<NaiveDate>,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "lenient_date::option")
    )]
    pub due_date: Option<NaiveDate>,
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "lenient_date::option")
    )]
    pub created_at: Option<NaiveDate>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: LoanStatus,
    #[cfg_attr(feature = "serde", serde(default))]
    pub payments: Vec<Payment>,
}

impl Loan {
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        amount: f64,
        interest_rate: f64,
        payment_type: PaymentType,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            amount,
            total_amount: None,
            interest_rate: InterestRate(interest_rate),
            payment_type,
            installments: None,
            number_of_installments: None,
            installment_amount: None,
            start_date: None,
            due_date: None,
            created_at: None,
            status: LoanStatus::Active,
            payments: Vec::new(),
        }
    }

    /// The date the schedule counts from: due date, else start date, else
    /// creation date.
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        self.due_date.or(self.start_date).or(self.created_at)
    }

    /// `installments` when set and non-zero, otherwise `numberOfInstallments`.
    pub fn installment_count(&self) -> u32 {
        self.installments
            .filter(|&count| count > 0)
            .or(self.number_of_installments)
            .unwrap_or(0)
    }

    /// Per-slot amount when one is recorded.
    pub fn installment_value(&self) -> Option<f64> {
        self.installment_amount.filter(|&value| value > 0.)
    }

    /// Full repayment amount: principal plus all interest.
    pub fn total_with_interest(&self) -> f64 {
        let count = self.installment_count();
        match (self.payment_type, self.installment_value()) {
            (PaymentType::Installments | PaymentType::Diario, Some(value)) if count > 0 => {
                count as f64 * value
            }
            _ => self.total_amount.unwrap_or(self.amount),
        }
    }

    /// Simple interest owed for one period, recomputed from principal and rate.
    pub fn period_interest(&self) -> f64 {
        self.amount * (self.interest_rate.percent() / 100.)
    }

    /// This loan's receipts, in recorded order.
    pub fn receipts_in<'a>(&self, receipts: &'a [Receipt]) -> Vec<&'a Receipt> {
        receipts.iter().filter(|r| r.loan_id == self.id).collect()
    }

    /// This loan's payments: stored payments referencing it, followed by
    /// embedded payments not already seen by id.
    pub fn payments_in<'a>(&'a self, payments: &'a [Payment]) -> Vec<&'a Payment> {
        let mut found: Vec<&Payment> = payments.iter().filter(|p| p.loan_id == self.id).collect();
        let embedded: Vec<&Payment> = self
            .payments
            .iter()
            .filter(|p| !found.iter().any(|seen| seen.id == p.id))
            .collect();
        found.extend(embedded);
        found
    }

    /// Whether a full or manual-settlement payment exists for this loan.
    pub fn is_settled(&self, payments: &[Payment]) -> bool {
        self.payments_in(payments)
            .iter()
            .any(|p| p.kind.settles_loan())
    }

    pub fn has_manual_settlement(&self, payments: &[Payment]) -> bool {
        self.payments_in(payments)
            .iter()
            .any(|p| p.kind == PaymentKind::ManualSettlement)
    }
}

impl fmt::Display for Loan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loan {}, client {}, {} ({}), principal ${:.2}, total ${:.2}, rate {}%",
            self.id,
            self.client_id,
            self.payment_type,
            self.status,
            self.amount,
            self.total_with_interest(),
            self.interest_rate.percent()
        )
    }
}
