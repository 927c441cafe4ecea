pub mod handle_service;

pub use handle_service::{ClaimOutcome, HandleService, TransferInitiation};
