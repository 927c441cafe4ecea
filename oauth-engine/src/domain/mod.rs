mod entities;
mod value_objects;

pub use entities::{
    AccessTokenRecord, AuthorizationCode, ChallengeMethod, GrantType, OAuthClient,
    RefreshTokenRecord, TokenStatus,
};
pub use value_objects::{
    generate_token, hash_token, intersect_scopes, join_scope, parse_scope, verify_pkce,
};
