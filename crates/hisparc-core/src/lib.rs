pub mod analysis;
pub mod batch;
pub mod binning;
pub mod direction;
pub mod error;
pub mod error_model;
pub mod event;
pub mod geometry;
pub mod landau;
pub mod simplex;
pub mod spectrum;
pub mod store;
pub mod timing;

pub use analysis::{reconstruction_efficiency, UncertaintyAnalysis, UncertaintyCurve};
pub use batch::{do_full_reconstruction, reconstruct_angles, FullReconstruction, ReconstructionRun};
pub use binning::Binning;
pub use direction::{reconstruct_angle_dt, Direction};
pub use error::{ShowerError, ShowerResult};
pub use error_model::ErrorModel;
pub use event::{Coincidence, Observable, ReconstructedEvent, Reconstruction, Shower};
pub use geometry::{DetectorLayout, ReconstructionGeometry, Station};
pub use spectrum::{SpectrumFit, SpectrumFitter, SpectrumOptions};
pub use store::{DensityCut, EventFilter, PulseStore, ReconstructionStore, ShowerStore};
