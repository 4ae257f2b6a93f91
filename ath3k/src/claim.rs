use std::ops::{Deref, DerefMut};

use crate::usb::Close;

/// Scoped ownership of a device or interface handle
///
/// The handle is closed when the claim is dropped, unless the claim has been
/// put on [Claim::hold]. A held claim keeps the handle open until
/// [Claim::release] is called.
pub struct Claim<T: Close> {
    handle: T,
    held: bool,
}

impl<T: Close> Claim<T> {
    pub fn new(handle: T) -> Self {
        Claim {
            handle,
            held: false,
        }
    }

    /// Keep the handle open when this claim goes out of scope.
    pub fn hold(mut self) -> Self {
        self.held = true;
        self
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Close the handle now.
    pub fn release(mut self) {
        self.held = false;
    }
}

impl<T: Close> Deref for Claim<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T: Close> DerefMut for Claim<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.handle
    }
}

impl<T: Close> Drop for Claim<T> {
    fn drop(&mut self) {
        if !self.held {
            self.handle.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    struct Counted(Rc<Cell<u32>>);

    impl Close for Counted {
        fn close(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_close_on_drop() {
        let closed = Rc::new(Cell::new(0));
        drop(Claim::new(Counted(closed.clone())));
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_held_claim() {
        let closed = Rc::new(Cell::new(0));
        let claim = Claim::new(Counted(closed.clone())).hold();
        assert!(claim.is_held());
        drop(claim);
        assert_eq!(closed.get(), 0);

        let claim = Claim::new(Counted(closed.clone())).hold();
        claim.release();
        assert_eq!(closed.get(), 1);
    }
}
