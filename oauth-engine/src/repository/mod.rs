mod oauth_repository;

pub use oauth_repository::OAuthRepository;
