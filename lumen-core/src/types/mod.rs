// Index domain types shared by the scan pipeline and the watchers

pub mod asset;
pub mod files;
pub mod ids;
pub mod options;
pub mod result;

pub use asset::*;
pub use files::*;
pub use ids::*;
pub use options::*;
pub use result::*;
