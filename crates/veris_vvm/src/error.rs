//! Runtime and setup errors for the VM.

/// Errors from building or running the virtual machine.
///
/// Compile-time problems in assembly text are counted diagnostics, not
/// `Err`s; these variants cover the fatal conditions: starting a
/// simulation from a broken compile, and runtime faults that terminate
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum VvmError {
    /// The compile pass left errors; the simulation must not start.
    #[error("refusing to simulate: {count} compile errors")]
    CompileErrors {
        /// Number of compile errors accumulated.
        count: usize,
    },

    /// Functor propagation failed to reach a fixed point.
    #[error("functor iteration limit ({limit}) exceeded at time {time}")]
    IterationLimit {
        /// The simulation time of the runaway step.
        time: u64,
        /// The configured iteration bound.
        limit: u32,
    },

    /// A `%vpi_call` addressed a system task that is not registered.
    #[error("call to undefined system task: {name}")]
    UndefinedTask {
        /// The task name.
        name: String,
    },

    /// A `%disable` addressed a handle that is not a scope.
    #[error("%disable of unknown scope")]
    UnknownScope,

    /// An instruction addressed a functor outside the pool.
    #[error("invalid functor address {0:#x}")]
    InvalidFunctor(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            VvmError::CompileErrors { count: 3 }.to_string(),
            "refusing to simulate: 3 compile errors"
        );
        assert_eq!(
            VvmError::IterationLimit {
                time: 40,
                limit: 1000
            }
            .to_string(),
            "functor iteration limit (1000) exceeded at time 40"
        );
        assert_eq!(
            VvmError::UndefinedTask {
                name: "$missing".into()
            }
            .to_string(),
            "call to undefined system task: $missing"
        );
    }
}
