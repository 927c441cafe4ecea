mod entities;
mod value_objects;

pub use entities::{BackupCode, ChallengePurpose, ChallengeStatus, MfaChallenge, MfaMethod, MfaMethodType};
pub use value_objects::{
    constant_time_str_eq, encode_totp_secret, generate_backup_code, generate_numeric_code,
    generate_totp_secret, mask_identifier, totp_uri, verify_totp,
};
