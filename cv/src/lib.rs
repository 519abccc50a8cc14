//! # `cv`
//!
//! Batteries-included L-infinity multiple-view geometry
//!
//! This crate should only be used for documentation/reference and for quickly creating and
//! running a multiple-view geometry routine. It gathers the linear programming layer and the
//! L-infinity solvers built on top of it in one place for discoverability. If you are making a
//! production application, import the dependencies from this crate individually.
//!
//! All of the basic types/dependencies are included in the root of the crate.
//!
//! ## Modules
//! * [`linprog`] - linear programs and the engines that solve them
//! * [`optimize`] - the bisection over admissible errors
//! * [`estimate`] - estimation of points and cameras from data
//! * [`mvg`] - registration of many cameras at once

#![no_std]

pub use nalgebra;
pub use sample_consensus::*;

/// Linear programs and LP engine adapters
pub mod linprog {
    pub use cv_linprog::*;
}

/// Quasi-convex optimization by bisection
pub mod optimize {
    #[cfg(feature = "cv-linfinity")]
    pub use cv_linfinity::{
        Bisection, BisectionSolution, BisectionStep, BisectionSteps, ConstraintBuilder,
        LinfError,
    };
}

/// Estimation algorithms
pub mod estimate {
    #[cfg(feature = "cv-linfinity")]
    pub use cv_linfinity::{
        LinfResection, LinfTriangulator, ProjectionMatrix, Resection, ResectionEncoder,
        ResectionMatch, TriangulatedPoint, TriangulationEncoder,
    };
}

/// Multiple-view geometry (translation registration and averaging)
pub mod mvg {
    #[cfg(feature = "cv-linfinity")]
    pub use cv_linfinity::{
        GlobalTranslations, GlobalTranslationsEncoder, Observation, RegisteredStructure,
        RegisteredTranslations, RelativeMotion, TranslationAveraging, TranslationRegistration,
        TranslationStructure, TranslationStructureEncoder, Triplet, TripletMotions,
    };
}
