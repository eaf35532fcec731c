//! Application services built on the outbound ports.

pub mod query;
pub mod scan;
pub mod submission;
pub mod token_overlay;

pub use query::{HistoryOptions, QueryService};
pub use scan::{scan, ScanFilter};
pub use submission::{SubmissionService, Submitted};
pub use token_overlay::TokenOverlay;
