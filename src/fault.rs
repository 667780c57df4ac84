use rand::Rng;

/// The coin flipped by error mode.
///
/// Each guarded operation asks once; `true` means the operation should fail.
/// Production uses [`RandomFaults`]; tests substitute a fixed outcome.
pub trait FaultInjector: Send + Sync {
    fn should_fail(&self) -> bool;
}

/// Fair coin backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomFaults;

impl FaultInjector for RandomFaults {
    fn should_fail(&self) -> bool {
        rand::thread_rng().gen_bool(0.5)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysFail;

impl FaultInjector for AlwaysFail {
    fn should_fail(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverFail;

impl FaultInjector for NeverFail {
    fn should_fail(&self) -> bool {
        false
    }
}

/// Apply the error-mode policy: only sessions with the flag set flip the coin.
pub fn tripped(error_mode: bool, faults: &dyn FaultInjector) -> bool {
    error_mode && faults.should_fail()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_off_never_trips() {
        assert!(!tripped(false, &AlwaysFail));
        assert!(!tripped(false, &RandomFaults));
    }

    #[test]
    fn flag_on_follows_coin() {
        assert!(tripped(true, &AlwaysFail));
        assert!(!tripped(true, &NeverFail));
    }

    #[test]
    fn random_coin_lands_both_ways() {
        let coin = RandomFaults;
        let fails = (0..1000).filter(|_| coin.should_fail()).count();
        // P(all same side) over 1000 flips is negligible.
        assert!(fails > 0 && fails < 1000, "fails = {fails}");
    }
}
