//! Module interfaces
//!
//! Cyclic processing modules (the levitation controller is one) implement [`State`] so that every
//! module is initialised once from its parameters and then stepped once per control cycle.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, usually the module's parameters
    type InitData;
    type InitError;

    /// Data required for one cycle.
    type InputData;
    /// Data produced by one cycle, e.g. an actuator demand.
    type OutputData;
    /// Diagnostic information about one cycle.
    type StatusReport;
    type ProcError;

    /// Initialise the module. Cyclic processing before a successful `init` must fail.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError>;

    /// Run one cycle, returning the output and a status report.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Create a default module and initialise it.
pub fn init_state<S>(init_data: S::InitData) -> Result<S, S::InitError>
where
    S: State + Default
{
    let mut state = S::default();
    state.init(init_data)?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Counts cycles from a configurable start.
    #[derive(Default)]
    struct Counter {
        count: Option<u32>,
    }

    impl State for Counter {
        type InitData = u32;
        type InitError = ();
        type InputData = u32;
        type OutputData = u32;
        type StatusReport = ();
        type ProcError = &'static str;

        fn init(&mut self, init_data: u32) -> Result<(), ()> {
            self.count = Some(init_data);
            Ok(())
        }

        fn proc(&mut self, step: &u32) -> Result<(u32, ()), &'static str> {
            let count = self.count.as_mut().ok_or("not initialised")?;
            *count += step;
            Ok((*count, ()))
        }
    }

    #[test]
    fn test_init_state() {
        let mut counter: Counter = init_state(10).expect("Init failed");
        assert_eq!(counter.proc(&2), Ok((12, ())));

        let mut uninit = Counter::default();
        assert_eq!(uninit.proc(&2), Err("not initialised"));
    }
}
