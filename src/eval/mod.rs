pub mod report;
pub mod verdict;

pub use report::EvaluationReport;
pub use verdict::{classify, Thresholds, Verdict};
