pub mod error;
pub mod saves;
pub mod seed;
pub mod store;

pub use error::{IoError, Result};
pub use saves::{create_save, list_saves, load_save, rotate_autosave, SaveMeta};
pub use seed::{generate_map, seed_species, seed_world};
pub use store::{
    Database, EnvironmentStore, GenusRecord, HistoryStore, LineageEventRow, SpeciesStore, TurnLog,
};
