// 🧾 Receipt Ingestion Policy - the only writer of ledger + vitality
//
// Check-then-commit: affordability is validated before anything is derived,
// so a rejected submission returns the error and the caller keeps the
// snapshot it already holds. Accepted submissions produce a new snapshot
// with the ledger and vitality changes applied together.

use crate::error::{ensure_positive_amount, EngineError, EngineResult};
use crate::ledger::Allowance;
use crate::vitality::{apply_deposit_bonus, apply_spend_penalty, spend_penalty, VitalityState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// EVENTS
// ============================================================================

/// Normalised receipt handed over by the parser/categorizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReceiptEventWire")]
pub struct ReceiptEvent {
    id: String,
    total: f64,
    category: String,
    health_delta: i32,
    happiness_delta: i32,
    occurred_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ReceiptEventWire {
    id: String,
    total: f64,
    category: String,
    health_delta: i32,
    happiness_delta: i32,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<ReceiptEventWire> for ReceiptEvent {
    type Error = EngineError;

    fn try_from(raw: ReceiptEventWire) -> EngineResult<Self> {
        ReceiptEvent::new(
            raw.id,
            raw.total,
            raw.category,
            raw.health_delta,
            raw.happiness_delta,
            raw.occurred_at,
        )
    }
}

impl ReceiptEvent {
    pub fn new(
        id: String,
        total: f64,
        category: String,
        health_delta: i32,
        happiness_delta: i32,
        occurred_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let total = ensure_positive_amount(total)?;
        Ok(ReceiptEvent {
            id,
            total,
            category,
            health_delta,
            happiness_delta,
            occurred_at,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn health_delta(&self) -> i32 {
        self.health_delta
    }

    pub fn happiness_delta(&self) -> i32 {
        self.happiness_delta
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
}

impl DepositEvent {
    pub fn new(amount: f64, occurred_at: DateTime<Utc>) -> EngineResult<Self> {
        let amount = ensure_positive_amount(amount)?;
        Ok(DepositEvent { amount, occurred_at })
    }

    pub fn now(amount: f64) -> EngineResult<Self> {
        Self::new(amount, Utc::now())
    }
}

// ============================================================================
// ENGINE STATE
// ============================================================================

/// The ledger/vitality pair, always replaced as a whole
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub allowance: Allowance,
    pub vitality: VitalityState,
}

impl EngineState {
    /// Start of a session: full allowance, full vitality
    pub fn fresh(allowance_total: f64) -> EngineResult<Self> {
        Ok(EngineState {
            allowance: Allowance::new(allowance_total)?,
            vitality: VitalityState::default(),
        })
    }

    pub fn new(allowance: Allowance, vitality: VitalityState) -> Self {
        EngineState { allowance, vitality }
    }

    pub fn submit(&self, receipt: &ReceiptEvent) -> EngineResult<EngineState> {
        submit(receipt, self)
    }

    pub fn deposit(&self, event: &DepositEvent) -> EngineResult<EngineState> {
        deposit(event.amount, self)
    }
}

// ============================================================================
// TRANSITIONS
// ============================================================================

/// Spend transition: recordSpend + applySpendPenalty as one unit
pub fn submit(receipt: &ReceiptEvent, state: &EngineState) -> EngineResult<EngineState> {
    let amount = ensure_positive_amount(receipt.total())?;

    if !state.allowance.can_afford_spend(amount) {
        let remaining = state.allowance.remaining();
        warn!(
            receipt_id = receipt.id(),
            requested = amount,
            remaining,
            "receipt rejected: insufficient funds"
        );
        return Err(EngineError::InsufficientFunds {
            requested: amount,
            remaining,
        });
    }

    // Affordability already checked; this cannot fail
    let allowance = state.allowance.record_spend(amount)?;
    let vitality = apply_spend_penalty(
        state.vitality,
        amount,
        state.allowance.total(),
        receipt.health_delta(),
        receipt.happiness_delta(),
    );

    info!(
        receipt_id = receipt.id(),
        total = amount,
        category = receipt.category(),
        penalty = spend_penalty(amount, state.allowance.total()),
        health = vitality.health(),
        happiness = vitality.happiness(),
        remaining = allowance.remaining(),
        "receipt accepted"
    );

    Ok(EngineState { allowance, vitality })
}

/// Deposit transition: recordDeposit + applyDepositBonus as one unit
pub fn deposit(amount: f64, state: &EngineState) -> EngineResult<EngineState> {
    let amount = ensure_positive_amount(amount)?;

    if !state.allowance.can_afford_deposit(amount) {
        let remaining = state.allowance.remaining();
        warn!(requested = amount, remaining, "deposit rejected: insufficient funds");
        return Err(EngineError::InsufficientFunds {
            requested: amount,
            remaining,
        });
    }

    let allowance = state.allowance.record_deposit(amount)?;
    let vitality = apply_deposit_bonus(state.vitality);

    info!(
        amount,
        piggy_bank = allowance.piggy_bank(),
        happiness = vitality.happiness(),
        remaining = allowance.remaining(),
        "deposit accepted"
    );

    Ok(EngineState { allowance, vitality })
}

// ============================================================================
// TESTS
// ============================================================================
