//! A small set of element kinds.

mod column;
mod container;
mod label;
mod tree_model;

pub use column::{Column, ColumnState};
pub use container::{Container, ContainerState};
pub use label::{Label, LabelState};
pub use tree_model::{TreeModel, TreeState};

use tern_core::KindRegistry;

/// A registry with every kind in the kit.
///
/// | element type                           | kind          |
/// |----------------------------------------|---------------|
/// | `menu-bar`, `menu`, `panel`, `table`   | [`Container`] |
/// | `item`, `label`                        | [`Label`]     |
/// | `tree`                                 | [`TreeModel`] |
/// | `column`                               | [`Column`]    |
pub fn registry() -> KindRegistry {
    let mut registry = KindRegistry::new();
    registry
        .register(&["menu-bar", "menu", "panel", "table"], Container)
        .register(&["item", "label"], Label)
        .register(&["tree"], TreeModel)
        .register(&["column"], Column);
    registry
}
