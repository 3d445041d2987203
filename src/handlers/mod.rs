pub mod channel;
pub mod control_points;
pub mod diagnostics;
pub mod editing_session;
pub mod health;
pub mod point_changes;

pub use channel::*;
pub use control_points::*;
pub use diagnostics::*;
pub use editing_session::*;
pub use health::*;
pub use point_changes::*;
