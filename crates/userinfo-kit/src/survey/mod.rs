//! The product-market-fit survey: typed response records, their persistence,
//! and the usage-gated eligibility engine that decides when to present it.

pub mod eligibility;
pub mod records;
pub mod response;

pub use eligibility::{Decision, PmfEngine};
pub use records::PmfResponseStore;
pub use response::{PmfAnswers, PmfFeedback, PmfResponse};
