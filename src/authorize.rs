use crate::structs::Card;

/// Purchase categories eligible for HSA spending.
pub const QUALIFIED_CATEGORIES: [&str; 5] = [
    "clinic",
    "dental",
    "medical_equipment",
    "pharmacy",
    "vision",
];

pub const REASON_APPROVED: &str = "Approved.";
pub const REASON_NOT_QUALIFIED: &str = "Category not HSA-qualified.";
pub const REASON_INVALID_CARD: &str = "Invalid or inactive card.";
pub const REASON_INSUFFICIENT_BALANCE: &str = "Insufficient balance.";

pub fn is_qualified(category: &str) -> bool {
    QUALIFIED_CATEGORIES.contains(&category)
}

/// Outcome of a purchase authorization, recorded verbatim on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub reason: &'static str,
}

impl Decision {
    pub fn declined(reason: &'static str) -> Self {
        Decision {
            approved: false,
            reason,
        }
    }
}

/// Decides a purchase against the fixed rule set. Rules run in order and
/// the first failing one wins: category eligibility, card validity, then
/// balance.
pub fn authorize(
    category: &str,
    card: Option<&Card>,
    balance_cents: i64,
    amount_cents: i64,
) -> Decision {
    if !is_qualified(category) {
        return Decision::declined(REASON_NOT_QUALIFIED);
    }
    match card {
        Some(card) if card.active => {}
        _ => return Decision::declined(REASON_INVALID_CARD),
    }
    if balance_cents < amount_cents {
        return Decision::declined(REASON_INSUFFICIENT_BALANCE);
    }
    Decision {
        approved: true,
        reason: REASON_APPROVED,
    }
}
