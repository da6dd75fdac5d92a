//! Leave and special-permission engine: balance ledger, request lifecycle, notifications
//! and the authorization rules that guard them.

pub mod gate;
pub mod ledger;
pub mod lifecycle;
pub mod notify;


pub use lifecycle::{AllocationRow, ImportReport, LeaveService, SubmitCommand};
