pub mod handle_repository;

pub use handle_repository::HandleRepository;
