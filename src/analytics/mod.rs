//! Pure aggregation rules shared by every dashboard.
//!
//! Nothing in here touches the store; repositories fetch raw sums and counts
//! and hand them to these functions so every domain applies the same rules.

pub mod dates;
pub mod growth;
pub mod percent;
pub mod productivity;

pub use dates::{trend_years, DateRange};
pub use growth::{growth_pct, Growth};
pub use percent::{percentage, round2, shares, with_percentages};
pub use productivity::{ProductivityTable, ProductivityYear};
