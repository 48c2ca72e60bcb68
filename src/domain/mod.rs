pub mod fees;
pub mod gateway;
pub mod ledger_entry;
pub mod payment;
pub mod ports;
