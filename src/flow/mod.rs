//! Transaction action flows
//!
//! One state machine serves every action kind; the kind supplies the ledger
//! kind it submits and the balances it validates against.

mod action;
mod amount;
mod machine;

pub use action::{ActionKind, ActionParams};
pub use amount::{format_amount, parse_amount};
pub use machine::{FlowSnapshot, FlowStep, TransactionActionFlow};
