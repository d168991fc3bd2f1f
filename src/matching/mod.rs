pub mod compat;
pub mod lifecycle;
pub mod matcher;
pub mod repository;
pub mod state;

pub use compat::{is_compatible, select_candidates, CompatibilityMode, SelectionContext};
pub(crate) use lifecycle::match_removal;
pub use lifecycle::{LiveSkills, MatchLifecycle, PostCascadeReport, SideSkills};
pub use matcher::CompatibilityMatcher;
pub use repository::MatchRepository;
pub use state::{InvalidTransition, MatchState};
