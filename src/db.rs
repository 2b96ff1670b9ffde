use crate::ingestion::{self, DepositEvent, EngineState};
use crate::ledger::Allowance;
use crate::parser::{CategorizedItem, ReceiptDraft};
use crate::vitality::{spend_penalty, VitalityState};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Event for audit trail: every accepted or rejected submission
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub session_id: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, session_id: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            data,
        }
    }
}

/// Accepted receipt as kept in history
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredReceipt {
    pub receipt_id: String,
    pub total: f64,
    pub category: String,
    pub health_delta: i32,
    pub happiness_delta: i32,
    pub penalty: i64,
    pub occurred_at: DateTime<Utc>,
    pub source_hash: String,
    pub items: Vec<CategorizedItem>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredDeposit {
    pub deposit_id: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Session state (one row per allowance/vitality pair)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            total REAL NOT NULL,
            spent REAL NOT NULL,
            piggy_bank REAL NOT NULL,
            health INTEGER NOT NULL,
            happiness INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Receipt history (accepted receipts only, never updated)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts (
            receipt_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            total REAL NOT NULL,
            category TEXT NOT NULL,
            health_delta INTEGER NOT NULL,
            happiness_delta INTEGER NOT NULL,
            penalty INTEGER NOT NULL,
            occurred_at TEXT NOT NULL,
            source_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipt_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receipt_id TEXT NOT NULL REFERENCES receipts(receipt_id),
            product TEXT NOT NULL,
            price REAL NOT NULL,
            category TEXT NOT NULL,
            health_delta INTEGER NOT NULL,
            happiness_delta INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS deposits (
            deposit_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            amount REAL NOT NULL,
            occurred_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            session_id TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_session ON receipts(session_id, occurred_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipt_items_receipt ON receipt_items(receipt_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_deposits_session ON deposits(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id, timestamp)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

// ============================================================================
// STATE
// ============================================================================

/// Load the session's ledger/vitality, defaulting to a fresh period
///
/// `allowance_total` is the configured total; stored spend and savings are
/// kept as they are, never rescaled.
pub fn load_state(conn: &Connection, session_id: &str, allowance_total: f64) -> Result<EngineState> {
    let row: Option<(f64, f64, i32, i32)> = conn
        .query_row(
            "SELECT spent, piggy_bank, health, happiness FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    match row {
        Some((spent, piggy_bank, health, happiness)) => {
            let vitality = VitalityState::restore(health, happiness)?;
            let allowance = Allowance::restore(allowance_total, spent, piggy_bank)?;
            Ok(EngineState::new(allowance, vitality))
        }
        None => {
            debug!(session_id, "no stored state, starting fresh");
            Ok(EngineState::fresh(allowance_total)?)
        }
    }
}

pub fn save_state(conn: &Connection, session_id: &str, state: &EngineState) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (session_id, total, spent, piggy_bank, health, happiness, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(session_id) DO UPDATE SET
            total = excluded.total,
            spent = excluded.spent,
            piggy_bank = excluded.piggy_bank,
            health = excluded.health,
            happiness = excluded.happiness,
            updated_at = excluded.updated_at",
        params![
            session_id,
            state.allowance.total(),
            state.allowance.spent(),
            state.allowance.piggy_bank(),
            state.vitality.health(),
            state.vitality.happiness(),
            Utc::now().to_rfc3339(),
        ],
    )?;

    Ok(())
}

// ============================================================================
// HISTORY
// ============================================================================

pub fn insert_receipt(
    conn: &Connection,
    session_id: &str,
    draft: &ReceiptDraft,
    penalty: i64,
) -> Result<()> {
    let event = &draft.event;

    conn.execute(
        "INSERT INTO receipts (
            receipt_id, session_id, total, category, health_delta, happiness_delta,
            penalty, occurred_at, source_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.id(),
            session_id,
            event.total(),
            event.category(),
            event.health_delta(),
            event.happiness_delta(),
            penalty,
            event.occurred_at().to_rfc3339(),
            draft.source_hash,
        ],
    )
    .context("Failed to insert receipt")?;

    for item in &draft.items {
        conn.execute(
            "INSERT INTO receipt_items (
                receipt_id, product, price, category, health_delta, happiness_delta
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id(),
                item.product,
                item.price,
                item.category,
                item.health_delta,
                item.happiness_delta,
            ],
        )?;
    }

    Ok(())
}

pub fn insert_deposit(conn: &Connection, session_id: &str, deposit: &DepositEvent) -> Result<String> {
    let deposit_id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO deposits (deposit_id, session_id, amount, occurred_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            deposit_id,
            session_id,
            deposit.amount,
            deposit.occurred_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert deposit")?;

    Ok(deposit_id)
}

fn get_receipt_items(conn: &Connection, receipt_id: &str) -> Result<Vec<CategorizedItem>> {
    let mut stmt = conn.prepare(
        "SELECT product, price, category, health_delta, happiness_delta
         FROM receipt_items
         WHERE receipt_id = ?1
         ORDER BY id",
    )?;

    let items = stmt
        .query_map(params![receipt_id], |row| {
            Ok(CategorizedItem {
                product: row.get(0)?,
                price: row.get(1)?,
                category: row.get(2)?,
                health_delta: row.get(3)?,
                happiness_delta: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Accepted receipts for a session, newest first, with their items
pub fn get_receipts(conn: &Connection, session_id: &str) -> Result<Vec<StoredReceipt>> {
    let mut stmt = conn.prepare(
        "SELECT receipt_id, total, category, health_delta, happiness_delta,
                penalty, occurred_at, source_hash
         FROM receipts
         WHERE session_id = ?1
         ORDER BY occurred_at DESC, created_at DESC",
    )?;

    let receipts = stmt
        .query_map(params![session_id], |row| {
            let occurred_at: String = row.get(6)?;
            Ok(StoredReceipt {
                receipt_id: row.get(0)?,
                total: row.get(1)?,
                category: row.get(2)?,
                health_delta: row.get(3)?,
                happiness_delta: row.get(4)?,
                penalty: row.get(5)?,
                occurred_at: parse_timestamp(&occurred_at)?,
                source_hash: row.get(7)?,
                items: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    receipts
        .into_iter()
        .map(|mut receipt| {
            receipt.items = get_receipt_items(conn, &receipt.receipt_id)?;
            Ok(receipt)
        })
        .collect()
}

/// Ids of accepted receipts built from the same raw text, newest first
pub fn get_receipt_ids_by_source(
    conn: &Connection,
    session_id: &str,
    source_hash: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT receipt_id
         FROM receipts
         WHERE session_id = ?1 AND source_hash = ?2
         ORDER BY occurred_at DESC",
    )?;

    let ids = stmt
        .query_map(params![session_id, source_hash], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(ids)
}

pub fn get_deposits(conn: &Connection, session_id: &str) -> Result<Vec<StoredDeposit>> {
    let mut stmt = conn.prepare(
        "SELECT deposit_id, amount, occurred_at
         FROM deposits
         WHERE session_id = ?1
         ORDER BY occurred_at DESC",
    )?;

    let deposits = stmt
        .query_map(params![session_id], |row| {
            let occurred_at: String = row.get(2)?;
            Ok(StoredDeposit {
                deposit_id: row.get(0)?,
                amount: row.get(1)?,
                occurred_at: parse_timestamp(&occurred_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(deposits)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, session_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.session_id,
            data_json,
        ],
    )?;

    Ok(())
}

/// Get events for a session, newest first
pub fn get_events_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, session_id, data
         FROM events
         WHERE session_id = ?1
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![session_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(4)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(&timestamp_str)?,
                event_type: row.get(2)?,
                session_id: row.get(3)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SESSION (load → validate → commit in one transaction)
// ============================================================================

/// Single writer for one session's ledger and vitality
///
/// Each mutation loads the stored state, runs the engine transition and
/// saves the result inside one SQLite transaction. Rejections record only an
/// audit event; the state rows are left as they were.
pub struct Session<'a> {
    conn: &'a mut Connection,
    session_id: String,
    allowance_total: f64,
}

impl<'a> Session<'a> {
    pub fn new(conn: &'a mut Connection, session_id: &str, allowance_total: f64) -> Self {
        Session {
            conn,
            session_id: session_id.to_string(),
            allowance_total,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> Result<EngineState> {
        load_state(&self.conn, &self.session_id, self.allowance_total)
    }

    pub fn receipts(&self) -> Result<Vec<StoredReceipt>> {
        get_receipts(&self.conn, &self.session_id)
    }

    /// Earlier receipts with the same source text as `draft`
    pub fn previous_submissions(&self, draft: &ReceiptDraft) -> Result<Vec<String>> {
        get_receipt_ids_by_source(&self.conn, &self.session_id, &draft.source_hash)
    }

    pub fn deposits(&self) -> Result<Vec<StoredDeposit>> {
        get_deposits(&self.conn, &self.session_id)
    }

    pub fn submit_receipt(&mut self, draft: &ReceiptDraft) -> Result<EngineState> {
        let tx = self.conn.transaction()?;
        let state = load_state(&tx, &self.session_id, self.allowance_total)?;

        match ingestion::submit(&draft.event, &state) {
            Ok(next) => {
                let penalty = spend_penalty(draft.event.total(), state.allowance.total());
                insert_receipt(&tx, &self.session_id, draft, penalty)?;
                save_state(&tx, &self.session_id, &next)?;
                insert_event(
                    &tx,
                    &Event::new(
                        "receipt_accepted",
                        &self.session_id,
                        serde_json::json!({
                            "receipt_id": draft.event.id(),
                            "total": draft.event.total(),
                            "category": draft.event.category(),
                            "penalty": penalty,
                        }),
                    ),
                )?;
                tx.commit()?;

                info!(session_id = %self.session_id, receipt_id = draft.event.id(), "receipt committed");
                Ok(next)
            }
            Err(err) => {
                insert_event(
                    &tx,
                    &Event::new(
                        "receipt_rejected",
                        &self.session_id,
                        serde_json::json!({
                            "receipt_id": draft.event.id(),
                            "total": draft.event.total(),
                            "reason": err.code(),
                        }),
                    ),
                )?;
                tx.commit()?;
                Err(err.into())
            }
        }
    }

    pub fn deposit(&mut self, deposit: &DepositEvent) -> Result<EngineState> {
        let tx = self.conn.transaction()?;
        let state = load_state(&tx, &self.session_id, self.allowance_total)?;

        match ingestion::deposit(deposit.amount, &state) {
            Ok(next) => {
                let deposit_id = insert_deposit(&tx, &self.session_id, deposit)?;
                save_state(&tx, &self.session_id, &next)?;
                insert_event(
                    &tx,
                    &Event::new(
                        "deposit_accepted",
                        &self.session_id,
                        serde_json::json!({
                            "deposit_id": deposit_id,
                            "amount": deposit.amount,
                        }),
                    ),
                )?;
                tx.commit()?;

                info!(session_id = %self.session_id, deposit_id = %deposit_id, "deposit committed");
                Ok(next)
            }
            Err(err) => {
                insert_event(
                    &tx,
                    &Event::new(
                        "deposit_rejected",
                        &self.session_id,
                        serde_json::json!({
                            "amount": deposit.amount,
                            "reason": err.code(),
                        }),
                    ),
                )?;
                tx.commit()?;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::categories::StatRuleTable;
    use crate::parser::{parse_receipt, ReceiptDraft};

    fn open_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn draft(text: &str) -> ReceiptDraft {
        let items = parse_receipt(text).unwrap();
        ReceiptDraft::build(&items, text, &StatRuleTable::new(), Utc::now()).unwrap()
    }

    #[test]
    fn test_load_defaults_when_absent() {
        let conn = open_db();
        let state = load_state(&conn, "kid", 50.0).unwrap();

        assert_eq!(state.allowance.total(), 50.0);
        assert_eq!(state.allowance.spent(), 0.0);
        assert_eq!(state.allowance.piggy_bank(), 0.0);
        assert_eq!(state.vitality.health(), 100);
        assert_eq!(state.vitality.happiness(), 100);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let conn = open_db();
        let state = EngineState::new(
            Allowance::restore(50.0, 12.5, 7.0).unwrap(),
            VitalityState::new(64, 71),
        );

        save_state(&conn, "kid", &state).unwrap();
        let loaded = load_state(&conn, "kid", 50.0).unwrap();

        assert_eq!(loaded, state);
    }

    #[test]
    fn test_lowered_total_reports_corrupt_state() {
        let conn = open_db();
        let state = EngineState::new(
            Allowance::restore(50.0, 30.0, 10.0).unwrap(),
            VitalityState::default(),
        );
        save_state(&conn, "kid", &state).unwrap();

        let err = load_state(&conn, "kid", 30.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::CorruptState(_))
        ));
    }

    #[test]
    fn test_out_of_range_vitality_reports_corrupt_state() {
        let conn = open_db();
        conn.execute(
            "INSERT INTO sessions (session_id, total, spent, piggy_bank, health, happiness, updated_at)
             VALUES ('kid', 50.0, 0.0, 0.0, 150, 80, ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();

        let err = load_state(&conn, "kid", 50.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::CorruptState(_))
        ));

        conn.execute("UPDATE sessions SET health = 60, happiness = -1", [])
            .unwrap();
        assert!(load_state(&conn, "kid", 50.0).is_err());
    }

    #[test]
    fn test_session_receipt_and_deposit_flow() {
        let mut conn = open_db();
        let mut session = Session::new(&mut conn, "kid", 50.0);

        let after_receipt = session
            .submit_receipt(&draft(r#"[{"product": "notebook", "price": 10, "category": "grocery"}]"#))
            .unwrap();
        assert_eq!(after_receipt.vitality.health(), 80);
        assert_eq!(after_receipt.allowance.remaining(), 40.0);

        let after_deposit = session.deposit(&DepositEvent::now(20.0).unwrap()).unwrap();
        assert_eq!(after_deposit.allowance.piggy_bank(), 20.0);
        assert_eq!(after_deposit.vitality.happiness(), 85);

        // Persisted after every mutation
        assert_eq!(session.snapshot().unwrap(), after_deposit);

        let receipts = session.receipts().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].penalty, 20);
        assert_eq!(receipts[0].items.len(), 1);
        assert_eq!(receipts[0].items[0].product, "notebook");

        assert_eq!(session.deposits().unwrap().len(), 1);

        println!("✅ Session flow PASSED");
    }

    #[test]
    fn test_rejected_deposit_leaves_stored_state() {
        let mut conn = open_db();
        {
            let mut session = Session::new(&mut conn, "kid", 50.0);
            session.submit_receipt(&draft("Book 10.00")).unwrap();
            session.deposit(&DepositEvent::now(20.0).unwrap()).unwrap();
            let before = session.snapshot().unwrap();

            let err = session.deposit(&DepositEvent::now(25.0).unwrap()).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<EngineError>(),
                Some(EngineError::InsufficientFunds { .. })
            ));

            assert_eq!(session.snapshot().unwrap(), before);
            assert_eq!(session.deposits().unwrap().len(), 1);
        }

        let events = get_events_for_session(&conn, "kid").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "deposit_rejected");
        assert_eq!(events[0].data["reason"], "insufficient_funds");
    }

    #[test]
    fn test_rejected_receipt_not_in_history() {
        let mut conn = open_db();
        let mut session = Session::new(&mut conn, "kid", 50.0);

        let err = session.submit_receipt(&draft("Bike 120.00")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InsufficientFunds { .. })
        ));

        assert!(session.receipts().unwrap().is_empty());
        assert_eq!(session.snapshot().unwrap(), EngineState::fresh(50.0).unwrap());
    }

    #[test]
    fn test_resubmitted_text_is_found_by_source_hash() {
        let mut conn = open_db();
        let mut session = Session::new(&mut conn, "kid", 50.0);

        let first = draft("Bread 1.50\nMilk 0.99");
        assert!(session.previous_submissions(&first).unwrap().is_empty());
        session.submit_receipt(&first).unwrap();

        let again = draft("  Bread 1.50\nMilk 0.99\n");
        assert_ne!(again.event.id(), first.event.id());
        assert_eq!(
            session.previous_submissions(&again).unwrap(),
            vec![first.event.id().to_string()]
        );

        assert!(session.previous_submissions(&draft("Apple 0.80")).unwrap().is_empty());
        assert!(get_receipt_ids_by_source(&conn, "other-kid", &first.source_hash)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut conn = open_db();
        Session::new(&mut conn, "anna", 50.0)
            .deposit(&DepositEvent::now(5.0).unwrap())
            .unwrap();

        let other = load_state(&conn, "ben", 50.0).unwrap();
        assert_eq!(other.allowance.piggy_bank(), 0.0);
        assert!(get_deposits(&conn, "ben").unwrap().is_empty());
    }
}
