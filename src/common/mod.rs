pub mod callback;
pub mod logger;
pub mod spaces;
pub mod timer;
pub mod utils;
