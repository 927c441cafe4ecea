mod entities;

pub use entities::{Identity, IdentityStatus, IdentitySummary, NewIdentity, NewSession, Session};
