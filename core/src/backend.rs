//! Traits for backends.

use crate::tree::{ElementTree, Patch};
use core::convert::Infallible;
use core::fmt;

/// A backend implementation: whatever turns the element tree into something on screen.
pub trait Backend {
    /// Error type.
    type Error: fmt::Display;

    /// Applies a patch.
    ///
    /// The tree has already been changed by the time patches arrive, so it may be inspected for
    /// details (like an element’s state).
    fn apply(&mut self, tree: &ElementTree, patch: Patch) -> Result<(), Self::Error>;
}

/// Records patches.
impl Backend for Vec<Patch> {
    type Error = Infallible;

    fn apply(&mut self, _: &ElementTree, patch: Patch) -> Result<(), Infallible> {
        self.push(patch);
        Ok(())
    }
}

/// Sends pending patches to a backend, in order.
///
/// Stops at the first error; patches after the failing one stay queued.
pub fn flush<B: Backend>(tree: &mut ElementTree, backend: &mut B) -> Result<usize, B::Error> {
    let mut count = 0;
    loop {
        let patch = tree.patches().next();
        match patch {
            Some(patch) => backend.apply(tree, patch)?,
            None => break,
        }
        count += 1;
    }
    Ok(count)
}
