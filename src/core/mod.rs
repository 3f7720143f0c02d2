pub mod relations;

pub use relations::{Relations, RelationsBuilder, TypedRelationsBuilder};
