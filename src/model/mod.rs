//! Survey data model

mod entities;
mod position;
mod store;

pub use entities::*;
pub use position::Fix;
pub use store::{IdOwner, MemoryStore, SurveyStore};
