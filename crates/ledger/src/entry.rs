use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{
    Amount, CompanyId, CustomerId, DomainError, DomainResult, Entity, GroupId, LedgerEntryId,
    UserId, Versioned, WorksiteId,
};

use crate::balance;

/// Transaction kind carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Payment,
    Invoice,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Payment => "payment",
            EntryKind::Invoice => "invoice",
        }
    }
}

impl core::str::FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "payment" => Ok(EntryKind::Payment),
            "invoice" => Ok(EntryKind::Invoice),
            other => Err(DomainError::validation(format!(
                "type must be one of: payment, invoice (got '{other}')"
            ))),
        }
    }
}

/// Payment-specific fields (cheque or bank transfer).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub bank: Option<String>,
    pub check_no: Option<String>,
    pub check_time: Option<NaiveDate>,
}

/// Invoice-specific fields (material line with tax and withholding rates).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub material: Option<String>,
    pub quantity: Option<Amount>,
    pub unit_price: Option<Amount>,
    pub price: Option<Amount>,
    pub tax: Option<Amount>,
    pub withholding: Option<Amount>,
}

/// Kind-specific part of an entry, tagged by `type`.
///
/// The balance contribution never looks at this; it only matters for
/// validation and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntryDetails {
    Payment(PaymentDetails),
    Invoice(InvoiceDetails),
}

impl EntryDetails {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryDetails::Payment(_) => EntryKind::Payment,
            EntryDetails::Invoice(_) => EntryKind::Invoice,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        match self {
            EntryDetails::Payment(p) => {
                ensure_not_blank("bank", p.bank.as_deref())?;
                ensure_not_blank("check_no", p.check_no.as_deref())?;
            }
            EntryDetails::Invoice(i) => {
                ensure_not_blank("material", i.material.as_deref())?;
            }
        }
        Ok(())
    }

    fn search_text(&self) -> Vec<&str> {
        match self {
            EntryDetails::Payment(p) => [p.bank.as_deref(), p.check_no.as_deref()]
                .into_iter()
                .flatten()
                .collect(),
            EntryDetails::Invoice(i) => i.material.as_deref().into_iter().collect(),
        }
    }
}

/// Client-supplied state for creating or replacing an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryDraft {
    pub customer: CustomerId,
    #[serde(flatten)]
    pub details: EntryDetails,
    pub debt: Option<Amount>,
    pub receivable: Option<Amount>,
    pub date: DateTime<Utc>,
    pub worksite: Option<WorksiteId>,
    pub group: Option<GroupId>,
    pub company: Option<CompanyId>,
    pub description: Option<String>,
}

impl LedgerEntryDraft {
    /// Field-level validation; runs before any balance arithmetic.
    ///
    /// Negative amounts cannot reach this point (`Amount` refuses them), but an
    /// entry with neither side set carries no money and is refused here.
    pub fn validate(&self) -> DomainResult<()> {
        if self.debt.is_none() && self.receivable.is_none() {
            return Err(DomainError::invalid_amount(
                "either debt or receivable must be set",
            ));
        }
        ensure_not_blank("description", self.description.as_deref())?;
        self.details.validate()
    }
}

fn ensure_not_blank(field: &str, value: Option<&str>) -> DomainResult<()> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(DomainError::validation(format!("{field} cannot be blank")))
        }
        _ => Ok(()),
    }
}

/// A persisted payment or invoice line owned by exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub details: EntryDetails,
    pub debt: Option<Amount>,
    pub receivable: Option<Amount>,
    pub date: DateTime<Utc>,
    pub worksite: Option<WorksiteId>,
    pub group: Option<GroupId>,
    pub company: Option<CompanyId>,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl LedgerEntry {
    pub fn create(
        id: LedgerEntryId,
        draft: LedgerEntryDraft,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        draft.validate()?;
        Ok(Self {
            id,
            customer_id: draft.customer,
            details: draft.details,
            debt: draft.debt,
            receivable: draft.receivable,
            date: draft.date,
            worksite: draft.worksite,
            group: draft.group,
            company: draft.company,
            description: draft.description.map(|d| d.trim().to_string()),
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// The next state of this entry after a full replacement.
    ///
    /// Identity, authorship and creation time carry over; the version moves
    /// forward by one.
    pub fn revise(&self, draft: LedgerEntryDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut next = Self::create(self.id, draft, self.created_by, now)?;
        next.created_at = self.created_at;
        next.version = self.version + 1;
        Ok(next)
    }

    pub fn kind(&self) -> EntryKind {
        self.details.kind()
    }

    /// Signed amount this entry adds to its customer's balance.
    pub fn contribution(&self) -> Decimal {
        balance::contribution(self.debt, self.receivable)
    }
}

impl Entity for LedgerEntry {
    type Id = LedgerEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for LedgerEntry {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Explicit list filter; every criterion is opt-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntryFilter {
    pub customer: Option<CustomerId>,
    #[serde(rename = "type")]
    pub kind: Option<EntryKind>,
    pub worksite: Option<WorksiteId>,
    pub group: Option<GroupId>,
    pub company: Option<CompanyId>,
    /// Case-insensitive substring over description, material, bank and cheque number.
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn for_customer(customer: CustomerId) -> Self {
        Self {
            customer: Some(customer),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if self.customer.is_some_and(|c| c != entry.customer_id) {
            return false;
        }
        if self.kind.is_some_and(|k| k != entry.kind()) {
            return false;
        }
        if self.worksite.is_some() && self.worksite != entry.worksite {
            return false;
        }
        if self.group.is_some() && self.group != entry.group {
            return false;
        }
        if self.company.is_some() && self.company != entry.company {
            return false;
        }
        if self.date_from.is_some_and(|from| entry.date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| entry.date > to) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                entry
                    .description
                    .as_deref()
                    .into_iter()
                    .chain(entry.details.search_text())
                    .any(|hay| hay.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Ordering used by every entry listing: newest date first, ties by id.
pub fn sort_newest_first(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}
