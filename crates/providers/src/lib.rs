//! Oracle implementations for TutorLink.
//!
//! All backends implement the `tutorlink_core::Oracle` trait.
//! The router selects the backend based on configuration and wraps it in
//! the retry policy.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatOracle;
pub use retry::RetryingOracle;
pub use router::{build_from_config, build_oracle, OracleRouter};
