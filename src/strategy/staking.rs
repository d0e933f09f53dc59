//! Stake sizing from the loss streak.
//!
//! The ladder escalates the stake after every consecutive loss. Two
//! safeguards suspend new entries:
//! - **Emergency stop**: the streak reached `emergency_stop_losses`
//! - **Ladder exhausted**: the streak reached `max_ladder_index`
//!
//! Both end with the streak reset to zero once their cooldown elapses.

use crate::config::StakingConfig;
use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;

/// Whether a new entry may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryGate {
    Open,
    EmergencyStop,
    LadderExhausted,
}

impl EntryGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryGate::Open => "open",
            EntryGate::EmergencyStop => "emergency_stop",
            EntryGate::LadderExhausted => "ladder_exhausted",
        }
    }
}

/// Stateless view over the staking section of the config.
#[derive(Debug, Clone)]
pub struct StakingController {
    ladder: Vec<Decimal>,
    max_ladder_index: u32,
    emergency_stop_losses: u32,
    emergency_cooldown: Duration,
    ladder_cooldown: Duration,
}

impl StakingController {
    /// Build from a validated staking config (non-empty ladder).
    pub fn new(config: &StakingConfig) -> Self {
        Self {
            ladder: config.ladder.clone(),
            max_ladder_index: config.max_ladder_index,
            emergency_stop_losses: config.emergency_stop_losses,
            emergency_cooldown: config.emergency_cooldown(),
            ladder_cooldown: config.ladder_cooldown(),
        }
    }

    /// Stake for the given streak, clamped to the last rung.
    pub fn size_for(&self, streak: u32) -> Decimal {
        let last = self.ladder.len().saturating_sub(1);
        let index = (streak as usize).min(last);
        self.ladder.get(index).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn can_enter(&self, streak: u32) -> bool {
        streak < self.max_ladder_index
    }

    pub fn is_emergency_stop(&self, streak: u32) -> bool {
        streak >= self.emergency_stop_losses
    }

    /// Emergency stop wins when both safeguards trip.
    pub fn gate(&self, streak: u32) -> EntryGate {
        if self.is_emergency_stop(streak) {
            EntryGate::EmergencyStop
        } else if !self.can_enter(streak) {
            EntryGate::LadderExhausted
        } else {
            EntryGate::Open
        }
    }

    /// How long entries stay suspended for a closed gate.
    pub fn cooldown(&self, gate: EntryGate) -> Option<Duration> {
        match gate {
            EntryGate::Open => None,
            EntryGate::EmergencyStop => Some(self.emergency_cooldown),
            EntryGate::LadderExhausted => Some(self.ladder_cooldown),
        }
    }

    pub fn ladder(&self) -> &[Decimal] {
        &self.ladder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn controller(max_ladder_index: u32, emergency_stop_losses: u32) -> StakingController {
        StakingController::new(&StakingConfig {
            ladder: vec![dec!(0.006), dec!(0.012), dec!(0.024), dec!(0.048), dec!(0.096)],
            max_ladder_index,
            emergency_stop_losses,
            emergency_cooldown_secs: 3600,
            ladder_cooldown_secs: 300,
        })
    }

    #[test]
    fn test_size_for_clamps_to_last_rung() {
        let staking = controller(5, 5);
        let ladder = staking.ladder().to_vec();
        for streak in 0..20u32 {
            let expected = ladder[(streak as usize).min(ladder.len() - 1)];
            assert_eq!(staking.size_for(streak), expected);
        }
        assert_eq!(staking.size_for(0), dec!(0.006));
        assert_eq!(staking.size_for(4), dec!(0.096));
        assert_eq!(staking.size_for(9), dec!(0.096));
    }

    #[test]
    fn test_can_enter_below_max_index() {
        let staking = controller(3, 10);
        assert!(staking.can_enter(2));
        assert!(!staking.can_enter(3));
        assert_eq!(staking.gate(3), EntryGate::LadderExhausted);
        assert_eq!(
            staking.cooldown(EntryGate::LadderExhausted),
            Some(Duration::seconds(300))
        );
    }

    #[test]
    fn test_emergency_stop_precedence() {
        let staking = controller(5, 5);
        assert_eq!(staking.gate(4), EntryGate::Open);
        assert!(staking.is_emergency_stop(5));
        assert_eq!(staking.gate(5), EntryGate::EmergencyStop);
        assert_eq!(
            staking.cooldown(EntryGate::EmergencyStop),
            Some(Duration::seconds(3600))
        );
        assert_eq!(staking.cooldown(EntryGate::Open), None);
    }
}
