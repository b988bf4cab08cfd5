mod content;
mod course;
mod module;
mod series;
mod user;

pub use content::*;
pub use course::*;
pub use module::*;
pub use series::*;
pub use user::*;
