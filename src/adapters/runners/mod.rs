//! Goal runner adapters.

mod scripted;
mod simulated;

pub use scripted::{ScriptedGoalRunner, ScriptedResponse};
pub use simulated::{plan_portfolio, SimulatedGoalRunner};
