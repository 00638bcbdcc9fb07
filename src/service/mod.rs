pub mod attendance;
pub mod join;
pub mod personal;

pub use attendance::AttendanceService;
pub use join::{JoinOutcome, JoinService};
pub use personal::PersonalCodeService;
