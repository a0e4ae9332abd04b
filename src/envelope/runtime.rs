//! The host-defined runtime state owned by an envelope

use std::any::Any;

/// The constructed model state, exclusively owned by one envelope.
///
/// The concrete type is the host's business; slots downcast to it. The
/// instance is replaced wholesale when the envelope is reconstructed and
/// is never handed out mutably, so outside code cannot partially mutate
/// it — all mutation goes through the behavior slots.
pub struct RuntimeInstance {
    inner: Box<dyn Any>,
}

impl RuntimeInstance {
    /// Wrap a host value as the runtime instance.
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// Borrow the host value, if it has the expected type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Mutably borrow the host value, if it has the expected type.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.inner.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for RuntimeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RuntimeInstance(..)")
    }
}
