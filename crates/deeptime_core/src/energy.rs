//! Metagame energy bookkeeping. Pressures cost energy; the pool regenerates
//! each round. Observes the simulation, never steers it.

use std::sync::Mutex;

#[derive(Debug)]
pub struct EnergyStore {
    state: Mutex<EnergyState>,
}

#[derive(Debug, Clone, Copy)]
struct EnergyState {
    current: f64,
    cap: f64,
    regen_per_round: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct InsufficientEnergy {
    pub need: f64,
    pub have: f64,
}

impl std::fmt::Display for InsufficientEnergy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "insufficient energy: need {:.1}, have {:.1}",
            self.need, self.have
        )
    }
}

impl std::error::Error for InsufficientEnergy {}

impl Default for EnergyStore {
    fn default() -> Self {
        Self::new(200.0, 400.0, 25.0)
    }
}

impl EnergyStore {
    pub fn new(initial: f64, cap: f64, regen_per_round: f64) -> Self {
        Self {
            state: Mutex::new(EnergyState {
                current: initial.min(cap),
                cap,
                regen_per_round,
            }),
        }
    }

    pub fn available(&self) -> f64 {
        self.state.lock().map(|s| s.current).unwrap_or(0.0)
    }

    pub fn debit(&self, amount: f64) -> Result<(), InsufficientEnergy> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.current + 1e-9 < amount {
            return Err(InsufficientEnergy {
                need: amount,
                have: state.current,
            });
        }
        state.current -= amount;
        Ok(())
    }

    pub fn regenerate(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.current = (state.current + state.regen_per_round).min(state.cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_and_regen() {
        let store = EnergyStore::new(50.0, 100.0, 30.0);
        store.debit(40.0).unwrap();
        assert!((store.available() - 10.0).abs() < 1e-9);
        let err = store.debit(20.0).unwrap_err();
        assert!((err.have - 10.0).abs() < 1e-9);
        store.regenerate();
        assert!((store.available() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_regen_respects_cap() {
        let store = EnergyStore::new(95.0, 100.0, 30.0);
        store.regenerate();
        assert!((store.available() - 100.0).abs() < 1e-9);
    }
}
