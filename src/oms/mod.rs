//! Order management: identities, the ledger and simulated execution

pub mod execution;
pub mod ledger;
pub mod types;

pub use execution::{check_fill, fill_price, SimAccount};
pub use ledger::{CancelOutcome, FillOutcome, LedgerError, OrderLedger};
pub use types::{Order, OrderHandle, OrderId, OrderKind, OrderSpec, OrderStatus};
