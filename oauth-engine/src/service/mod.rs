mod oauth_service;

pub use oauth_service::{
    AuthContext, AuthorizeRequest, AuthorizeResponse, OAuthService, TokenPair, KNOWN_SCOPES,
};
