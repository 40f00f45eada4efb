use invocation::ModuleInvocation;

/// Told about structural changes to an `InvocationSequence`.
pub trait SequenceObserver {
    fn inserted(&mut self, _inv: &ModuleInvocation, _position: usize) {}
    fn removed(&mut self, _inv: &ModuleInvocation) {}
    fn cleared(&mut self) {}
}

/// Logs every structural change at debug level.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SequenceObserver for LogObserver {
    fn inserted(&mut self, inv: &ModuleInvocation, position: usize) {
        log::debug!("inserted \"{}\" ({}) at {position}", inv.name(), inv.id());
    }

    fn removed(&mut self, inv: &ModuleInvocation) {
        log::debug!("removed \"{}\" ({})", inv.name(), inv.id());
    }

    fn cleared(&mut self) {
        log::debug!("cleared sequence");
    }
}
