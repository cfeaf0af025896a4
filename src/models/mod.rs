pub mod clock;
pub mod note;
pub mod review_manager;
pub mod review_state;
pub mod sm2;

pub use clock::{Clock, FixedClock, SystemClock};
pub use note::{Note, NoteSummary};
pub use review_manager::ReviewManager;
pub use review_state::{ReviewEntry, ReviewState, ReviewStats};
