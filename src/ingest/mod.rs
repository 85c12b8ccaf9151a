//! The ingestion pipeline.
//!
//! A *cycle* takes one source from fetch to commit:
//!
//! ```text
//! fetch ──► normalize ──► bulk link lookup ──► select new ──► commit
//!   │                                              │            (items + checkpoint,
//!   └─ FetchError                                  └─ NothingNew  one transaction)
//! ```
//!
//! A *pass* runs one cycle per configured source, sequentially, isolating
//! failures. Passes are started by the [`Scheduler`] on a cron calendar or by
//! a manual trigger; both go through [`Ingestor::run_pass`] and never overlap.

mod cycle;
mod dedup;
mod normalize;
mod scheduler;

pub use cycle::{
    CycleError, CycleOutcome, Ingestor, PassReport, SourceReport, SourceStatus,
};
pub use dedup::{candidate_links, select_new};
pub use normalize::{CandidateItem, EntryNormalizer, DEFAULT_MAX_DESCRIPTION_CHARS};
pub use scheduler::{parse_schedule, Scheduler, SchedulerError, DEFAULT_SCHEDULE};
