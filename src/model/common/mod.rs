//! Types and pure logic shared between the database and API layers.

pub mod clock;
pub mod eligibility;
pub mod identity;
pub mod tally;
pub mod validation;
