pub mod consolidation;
pub mod core;
pub mod diagnostics;
pub mod hierarchy;
pub mod orphans;
pub mod readiness;
