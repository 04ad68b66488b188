use core::convert::Infallible;

pub trait Clock {
    fn now_ms(&self) -> u64;
    fn delay_ms(&mut self, ms: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

// `ready` is always checked at least once, and once more after the final delay.
pub fn try_wait_until<C, E, F>(
    clock: &mut C,
    timeout_ms: u64,
    poll_ms: u64,
    mut ready: F,
) -> Result<WaitOutcome, E>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool, E>,
{
    let started = clock.now_ms();
    loop {
        if ready()? {
            return Ok(WaitOutcome::Ready);
        }

        let elapsed = clock.now_ms().saturating_sub(started);
        if elapsed >= timeout_ms {
            return Ok(WaitOutcome::TimedOut);
        }

        clock.delay_ms(poll_ms.min(timeout_ms - elapsed).max(1));
    }
}

pub fn wait_until<C, F>(clock: &mut C, timeout_ms: u64, poll_ms: u64, mut ready: F) -> WaitOutcome
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    match try_wait_until(clock, timeout_ms, poll_ms, || Ok::<_, Infallible>(ready())) {
        Ok(outcome) => outcome,
        Err(never) => match never {},
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct SimClock {
        pub now_ms: u64,
        pub delays: Vec<u64>,
    }

    impl Clock for SimClock {
        fn now_ms(&self) -> u64 {
            self.now_ms
        }

        fn delay_ms(&mut self, ms: u64) {
            self.now_ms += ms;
            self.delays.push(ms);
        }
    }

    #[test]
    fn returns_ready_without_delay_when_already_ready() {
        let mut clock = SimClock::default();
        let outcome = wait_until(&mut clock, 1_000, 10, || true);

        assert_eq!(outcome, WaitOutcome::Ready);
        assert!(clock.delays.is_empty());
    }

    #[test]
    fn becomes_ready_after_some_polls() {
        let mut clock = SimClock::default();
        let mut polls = 0;
        let outcome = wait_until(&mut clock, 1_000, 10, || {
            polls += 1;
            polls == 4
        });

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(clock.delays, vec![10, 10, 10]);
    }

    #[test]
    fn times_out_after_deadline() {
        let mut clock = SimClock {
            now_ms: 5_000,
            ..SimClock::default()
        };
        let outcome = wait_until(&mut clock, 25, 10, || false);

        assert_eq!(outcome, WaitOutcome::TimedOut);
        // Last delay is trimmed to the remaining budget.
        assert_eq!(clock.delays, vec![10, 10, 5]);
        assert_eq!(clock.now_ms, 5_025);
    }

    #[test]
    fn predicate_errors_abort_the_wait() {
        let mut clock = SimClock::default();
        let result = try_wait_until(&mut clock, 100, 10, || Err::<bool, _>("bus fault"));

        assert_eq!(result, Err("bus fault"));
    }
}
