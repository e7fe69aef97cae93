pub mod data;

pub use data::habitat::HabitatRecord;
pub use data::hex::Axial;
pub use data::mortality::{
    DistributionStatus, MortalityResult, NicheMetrics, Tier, TileDistribution,
};
pub use data::pressure::{Modifier, PressureKind, PressureModifiers, PressureSpec};
pub use data::report::{
    BranchingEvent, MajorEvent, MapChange, MigrationEvent, ReemergenceEvent, SpeciesSnapshot,
    TurnReport,
};
pub use data::species::{
    DevelopmentStage, DietType, Dominance, DormantGenes, DormantOrgan, DormantTrait, HabitatType,
    Organ, Species, SpeciesStatus, StressRecord,
};
pub use data::tile::{Biome, MapState, MapTile};
pub use data::traits::TraitValidator;

pub type SpeciesId = i64;
pub type TileId = i64;

/// Largest exactly-representable integer population (2^53 - 1).
pub const MAX_POPULATION: u64 = (1u64 << 53) - 1;
