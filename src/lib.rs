// Mica Minca - Core Library
// Allowance ledger, vitality model and pet state for the CLI, API server, and tests

pub mod error;
pub mod ledger;
pub mod vitality;
pub mod ingestion;      // Spend/deposit transitions over EngineState
pub mod pet;
pub mod savings;
pub mod categories;     // Category catalogue + stat rules
pub mod parser;         // Structured receipt items (JSON / CSV / lines)
pub mod dashboard;
pub mod db;
pub mod config;

// Re-export commonly used types
pub use error::{EngineError, EngineResult};
pub use ledger::Allowance;
pub use vitality::{VitalityState, spend_penalty, apply_spend_penalty, apply_deposit_bonus};
pub use ingestion::{ReceiptEvent, DepositEvent, EngineState, submit, deposit};
pub use pet::{PetMood, PetView, select_mood, low_funds_warning, pet_view};
pub use savings::{
    SavingsTier, SavingsAdvice,
    advise, is_super_saver, deposit_feedback, quick_deposit_amounts,
};
pub use categories::{
    Categorizer, CategoryDelta, StatRuleTable,
    categories, normalize_category,
};
pub use parser::{
    ReceiptParser, ParsedItem, ReceiptFormat, CategorizedItem, ReceiptDraft,
    JsonItemsParser, CsvItemsParser, LineItemParser,
    detect_format, detect_parser, get_parser, parse_receipt,
};
pub use dashboard::Dashboard;
pub use db::{
    Event, Session, StoredReceipt, StoredDeposit,
    setup_database, load_state, save_state,
    insert_receipt, insert_deposit, get_receipts, get_receipt_ids_by_source, get_deposits,
    insert_event, get_events_for_session,
};
pub use config::{Config, ConfigError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
