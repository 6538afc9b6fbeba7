//! Factors that shape a raw route cost into a bid
//!
//! A bid is `base_cost * priority * capacity * time_window`, clamped to
//! [`VERY_HIGH_BID`]. Every factor is >= 0.5, and heavier, emptier and less
//! urgent assignments come out cheaper.

use crate::consensus::types::VERY_HIGH_BID;

/// Assumed travel speed turning a route cost into an arrival estimate.
pub const COST_PER_TICK: f64 = 10.0;

/// Heavy loads are preferred: the lower multiplier wins auctions.
pub fn priority_multiplier(weight: f64) -> f64 {
    if weight >= 5.0 {
        0.5
    } else if weight >= 2.0 {
        1.0
    } else {
        1.5
    }
}

/// Linear penalty in how full the vehicle already is: 1.0 when empty,
/// 3.0 when full. Vehicles without capacity are not penalised.
pub fn capacity_penalty(load: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 {
        return 1.0;
    }
    1.0 + 2.0 * (load / capacity)
}

/// Urgency of a deadline given the estimated completion time.
pub fn time_window_penalty(due_by: Option<f64>, base_cost: f64, current_time: f64) -> f64 {
    let Some(due_by) = due_by else {
        return 1.0;
    };

    let estimated_completion = current_time + base_cost / COST_PER_TICK;
    let slack = due_by - estimated_completion;

    if slack <= 0.0 {
        6.0
    } else if slack <= 100.0 {
        3.0
    } else if slack <= 300.0 {
        1.5
    } else {
        1.0
    }
}

pub fn shape_bid(base_cost: f64, weight: f64, load: f64, capacity: f64, due_by: Option<f64>, current_time: f64) -> f64 {
    let bid = base_cost
        * priority_multiplier(weight)
        * capacity_penalty(load, capacity)
        * time_window_penalty(due_by, base_cost, current_time);
    bid.min(VERY_HIGH_BID)
}
