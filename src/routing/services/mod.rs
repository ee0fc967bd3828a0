//! Routing table and dual-write mirroring.

mod dual_write;
mod router;

pub use dual_write::{DualWriteAdapter, MirrorHandle, MirrorOp, MirrorStats, MirrorStatsSnapshot};
pub use router::{
    CapabilityRouter, Resolved, Route, RoutingError, RoutingResult, TransitionGuard,
};
