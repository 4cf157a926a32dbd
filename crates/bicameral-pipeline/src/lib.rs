//! Bicameral Pipeline - hemispheres, harmonizer, consent gate and the coordinator that sequences them

pub mod articulation;
pub mod consent;
pub mod coordinator;
pub mod harmonizer;
pub mod hemisphere;
pub mod status;

pub use articulation::{Articulation, ArticulationSource, Articulator, LlmArticulator};
pub use consent::{ConsentGate, PolicyOutcome, PolicyRule, PolicyTable, Term, REFUSAL};
pub use coordinator::{PipelineCoordinator, PipelineOutcome, SuppliedVerdicts, DIRECT_SYSTEM_KEY};
pub use harmonizer::{
    comparator_for, resolve, Harmonizer, JaccardComparator, LiteralComparator, SimilarityComparator,
};
pub use hemisphere::HemisphereProcessor;
pub use status::{HemisphereGuard, RequestGuard, StatusBoard};
