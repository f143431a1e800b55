//! Domain types for Mercury.
//!
//! - [`LocationRecord`]: One decoded vehicle sighting
//! - [`RedactionPolicy`]: Fields blanked before locations leave the process
//! - [`Envelope`]: One JSON sub-message of a captured frame
//! - [`Exchange`] / [`ResponseBody`]: What a page tap reports

mod envelope;
mod exchange;
mod location;

pub use envelope::*;
pub use exchange::*;
pub use location::*;
