pub mod fact;
pub mod fact_set;
pub mod query;
pub mod report;
pub mod section;
