//! Account persistence for the session subsystem.
//!
//! Each identity domain owns its own account collection; the session
//! protocol only sees the [`AccountRepository`] trait.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;

pub use memory::MemoryAccountRepository;
pub use models::{Account, PublicAccount, Role};
pub use postgres::PgAccountRepository;
pub use repository::AccountRepository;
