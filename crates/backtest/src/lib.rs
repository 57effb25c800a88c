//! Walk-forward portfolio simulation of the strategy ensemble.

pub mod metrics;
pub mod simulation;

pub use metrics::{PortfolioStats, PortfolioTracker};
pub use simulation::{
    clamp_pnl, simulate_portfolio, EquityPoint, SimulatedTrade, SimulationConfig,
    SimulationResult,
};
