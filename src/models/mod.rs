pub mod control_points;
pub mod diagnostics;
pub mod error;
pub mod geo;
pub mod health;
pub mod messages;
pub mod point_change;
pub mod session;

pub use control_points::*;
pub use diagnostics::*;
pub use error::*;
pub use geo::*;
pub use health::*;
pub use messages::*;
pub use point_change::*;
pub use session::*;
