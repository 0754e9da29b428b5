#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating most pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Dispatch handlers are naturally long; splitting would be artificial
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatch;
pub(crate) mod errors;
pub mod events;
pub mod gateway;
pub mod live;
pub mod mirror;
pub mod platforms;
pub mod reply;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
