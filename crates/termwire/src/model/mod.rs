pub mod event;
pub mod ids;
pub mod run;
pub mod scenario;

pub use event::*;
pub use ids::RunId;
pub use run::*;
pub use scenario::*;
